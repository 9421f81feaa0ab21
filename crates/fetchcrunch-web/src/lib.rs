//! Self-extracting HTML documents.
//!
//! A document produced here is one byte stream read two ways. As HTML, the
//! wrapper markup runs a bootstrap that fetches the page itself and pipes it
//! through `DecompressionStream('deflate-raw')`. As raw DEFLATE, it inflates
//! to one line of junk followed by the payload script, which the bootstrap
//! evaluates.
//!
//! ```no_run
//! # async fn demo() -> Result<(), fetchcrunch_web::CrunchError> {
//! let html = fetchcrunch_web::crunch("alert(1)").await?;
//! # let _ = html;
//! # Ok(())
//! # }
//! ```

pub mod adapters;
pub mod bootstrap;
pub mod config;
pub mod engine;
pub mod html;

#[cfg(feature = "flate2")]
pub use adapters::flate::FlateCodec;
pub use bootstrap::{BootstrapOptions, bootstrap_template};
pub use config::{CrunchConfig, DEFAULT_TEMPLATE};
#[cfg(feature = "flate2")]
pub use engine::crunch;
pub use engine::{FetchCrunch, Payload, clear_compiled_wrappers, compiled_wrapper};
pub use fetchcrunch_core::{
    AssemblyError, CodecError, Compressor, CrunchError, Decoding, Decompressor, LeadInError,
    LeadInPreference, TemplateError,
};
pub use html::{BOOTSTRAP_PLACEHOLDER, CompiledWrapper, IrItem, WrapperTemplates};
