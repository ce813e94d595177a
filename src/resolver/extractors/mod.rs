// Extraction backends
//
// Two interchangeable backends behind one trait:
// - yt-dlp: local subprocess (python module or native binary)
// - converter: third-party conversion HTTP API
//
// Both classify their failures through the shared FailureClassifier and never
// retry; the fallback resolver owns every retry decision.

mod converter;
mod diagnostics;
mod traits;
mod ytdlp;

pub use converter::{ConverterApiClient, ConverterCredentials};
pub use diagnostics::{
    diagnose_error, BlockingDiagnostics, BlockingReason, ClassifierRule, ClassifierRules,
    FailureClassifier,
};
pub use traits::{ExtractTarget, ExtractionClient};
pub use ytdlp::{YtDlpClient, YtDlpCommand};
