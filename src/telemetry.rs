use tracing::{Subscriber, subscriber::set_global_default};
use tracing_subscriber::{EnvFilter, Registry, fmt::MakeWriter, layer::SubscriberExt};

/// Builds the subscriber: `RUST_LOG` wins over `default_filter`, and events
/// are formatted as text into `sink`.
pub fn get_subscriber<Sink>(default_filter: &str, sink: Sink) -> impl Subscriber + Send + Sync
where
    Sink: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let formatting_layer = tracing_subscriber::fmt::layer()
        .with_writer(sink)
        .with_target(true);

    Registry::default().with(env_filter).with(formatting_layer)
}

/// Installs the subscriber for the whole process. A second call is a no-op.
pub fn init_subscriber(subscriber: impl Subscriber + Send + Sync) {
    if set_global_default(subscriber).is_err() {
        tracing::debug!("Global subscriber already installed");
    }
}
