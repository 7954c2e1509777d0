//! Failure visibility policy.
//!
//! Internal errors travel as `GateError` values up to one boundary in the host
//! (its request or command entry point), which calls [`render_failure`]. The
//! boundary always records the full error in the log sink and shows callers a
//! generic notice unless the gate runs in development mode.
//!
//! [`install_process_hooks`] covers what never reaches that boundary: panics
//! and `tracing` warnings emitted anywhere in the process.
use crate::config::RunMode;
use crate::core::GateError;
use crate::gate::Gate;
use crate::log_sink::LogSink;
use once_cell::sync::OnceCell;
use std::error::Error as _;
use std::fmt::{self, Write as _};
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

pub const GENERIC_HEADLINE: &str = "Something went wrong";
pub const GENERIC_BODY: &str = "Please check server error logs.";
pub const DETAILED_HEADLINE: &str = "Unhandled error";

/// What a caller is shown when an operation fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureNotice {
    pub headline: String,
    pub body: String,
}

impl FailureNotice {
    pub fn generic() -> Self {
        FailureNotice {
            headline: GENERIC_HEADLINE.to_string(),
            body: GENERIC_BODY.to_string(),
        }
    }

    pub fn detailed(body: String) -> Self {
        FailureNotice {
            headline: DETAILED_HEADLINE.to_string(),
            body,
        }
    }
}

impl fmt::Display for FailureNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\n{}", self.headline, self.body)
    }
}

/// Error text followed by its source chain, one cause per line.
pub fn describe(error: &GateError) -> String {
    let mut text = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !text.contains(&cause_text) {
            let _ = write!(text, "\ncaused by: {}", cause_text);
        }
        source = cause.source();
    }
    text
}

/// Logs `error` in full and returns the notice for the caller.
///
/// Fatal initialization errors are shown as is in every mode.
pub fn render_failure(error: &GateError, mode: RunMode, sink: &LogSink) -> FailureNotice {
    let full = describe(error);
    sink.write(&format!("Unhandled Exception: {}", full));

    if mode.is_development() || error.is_fatal() {
        FailureNotice::detailed(full)
    } else {
        FailureNotice::generic()
    }
}

/// Records WARN and ERROR events in the log sink.
///
/// Events from this crate are skipped: the gate writes those lines itself.
pub struct SinkLayer {
    sink: Arc<LogSink>,
}

impl SinkLayer {
    pub fn new(sink: Arc<LogSink>) -> Self {
        SinkLayer { sink }
    }
}

impl<S: Subscriber> Layer<S> for SinkLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        if *meta.level() > Level::WARN || is_own_target(meta.target()) {
            return;
        }

        let mut visitor = LineVisitor::default();
        event.record(&mut visitor);
        self.sink.write(&format!(
            "{} {}: {}{}",
            meta.level(),
            meta.target(),
            visitor.message,
            visitor.fields
        ));
    }
}

fn is_own_target(target: &str) -> bool {
    let crate_name = env!("CARGO_CRATE_NAME");
    target
        .strip_prefix(crate_name)
        .map_or(false, |rest| rest.is_empty() || rest.starts_with("::"))
}

#[derive(Default)]
struct LineVisitor {
    message: String,
    fields: String,
}

impl Visit for LineVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}

static HOOKS_INSTALLED: OnceCell<()> = OnceCell::new();

/// Installs the process-wide failure hooks for `gate`, once per process.
///
/// - panics are written to the log sink; callers see the generic notice on
///   stderr, or the default panic report in development mode
/// - WARN and ERROR `tracing` events are captured by [`SinkLayer`]; they are
///   also echoed to stderr in development mode only
///
/// The gate is initialized first so the run mode is known. Returns `false` when
/// hooks were already installed.
pub fn install_process_hooks(gate: &Gate) -> crate::core::Result<bool> {
    gate.initialize()?;
    let mode = gate.run_mode();
    let sink = Arc::clone(gate.sink());

    let mut installed = false;
    HOOKS_INSTALLED.get_or_init(|| {
        install_panic_hook(Arc::clone(&sink), mode);

        let echo = mode
            .is_development()
            .then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));
        let result = tracing_subscriber::registry()
            .with(SinkLayer::new(Arc::clone(&sink)))
            .with(echo)
            .try_init();
        if let Err(e) = result {
            sink.write(&format!("Tracing subscriber already installed: {}", e));
        }
        installed = true;
    });
    Ok(installed)
}

fn install_panic_hook(sink: Arc<LogSink>, mode: RunMode) {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        sink.write(&format!("Unhandled panic: {}", info));
        if mode.is_development() {
            previous(info);
        } else {
            eprintln!("{}", FailureNotice::generic());
        }
    }));
}
