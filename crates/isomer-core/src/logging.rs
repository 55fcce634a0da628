/// Installs the global tracing subscriber.
///
/// The default filter keeps wgpu's internal crates at `warn` so renderer
/// traces stay readable; override with `RUST_LOG` as usual.
pub fn init() {
    tracing_subscriber::fmt()
        .with_env_filter("info,wgpu_core=warn,wgpu_hal=warn,naga=warn")
        .init();
}
