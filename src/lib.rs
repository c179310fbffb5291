//! Screen translator: watches a screen region, recognizes its text, groups it into
//! paragraphs and hands translated overlays to a frame sink whenever the text changes.
//! Main library: pipeline wiring, collaborators and logging setup.

pub mod cancellation;
pub mod capture;
pub mod change;
pub mod config;
pub mod frame;
pub mod grouping;
pub mod metrics;
pub mod ocr;
pub mod pipeline;
pub mod state_machine;
pub mod translate;

pub use capture::{CaptureError, Rectangle, ScreenCapturer};
pub use config::{AppConfig, ConfigError};
pub use frame::{channel_sink, CaptureFrame, ChannelSink, FrameSink};
pub use grouping::{RegionGrouper, TextRegion};
pub use ocr::{RecognitionError, TextRecognizer, Word};
pub use pipeline::{ContinuousPipeline, PipelineComponents, PipelineError};
pub use state_machine::PipelineState;
pub use translate::{TranslateError, TranslationBackend, TranslationService};

/// Install the global tracing subscriber. `RUST_LOG` overrides the default filter.
/// Calling this twice is harmless; the second call is ignored.
pub fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("screen_translator=info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr);

    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if result.is_ok() {
        tracing::info!(json, "tracing initialized");
    }
}
