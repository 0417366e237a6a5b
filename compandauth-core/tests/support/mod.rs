use std::sync::Once;

use compandauth_core::{CounterRegistry, CredentialId, ValidationPolicy};
use tracing_subscriber::{
    EnvFilter, layer::SubscriberExt, util::SubscriberInitExt,
};

static TRACING: Once = Once::new();

/// Route registry logs to the test harness; honours `RUST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::registry()
            .with(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new("warn")),
            )
            .with(tracing_subscriber::fmt::layer().with_test_writer())
            .try_init();
    });
}

/// Registry with one freshly registered credential.
pub fn registry_with_credential(
    window: i64,
) -> anyhow::Result<(CounterRegistry, CredentialId)> {
    init_tracing();
    let registry = CounterRegistry::new(ValidationPolicy::new(window)?);
    let credential = CredentialId::new();
    registry.register(credential)?;
    Ok((registry, credential))
}
