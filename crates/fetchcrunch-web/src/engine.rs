//! The crunch pipeline: compile the wrapper, find a lead-in, then for each
//! decoding resolve the bootstrap against the payload and assemble.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, RwLock};

use fetchcrunch_core::bits::latin1_from_str;
use fetchcrunch_core::{
    Assembler, AssemblyError, AssemblyParts, ByteTemplate, Compressor, CrunchError, Decoding,
    Decompressor, LeadIn, TemplateError, generate_lead_in, resolve,
};

use crate::bootstrap::bootstrap_template;
use crate::config::CrunchConfig;
use crate::html::CompiledWrapper;

static COMPILED_WRAPPERS: OnceLock<RwLock<HashMap<String, Arc<CompiledWrapper>>>> =
    OnceLock::new();

fn compiled_wrappers() -> &'static RwLock<HashMap<String, Arc<CompiledWrapper>>> {
    COMPILED_WRAPPERS.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Compiles `template`, or returns the copy compiled earlier in this process.
pub fn compiled_wrapper(template: &str) -> Result<Arc<CompiledWrapper>, TemplateError> {
    if let Ok(cache) = compiled_wrappers().read() {
        if let Some(wrapper) = cache.get(template) {
            return Ok(Arc::clone(wrapper));
        }
    }

    let wrapper = Arc::new(CompiledWrapper::compile(template)?);
    if let Ok(mut cache) = compiled_wrappers().write() {
        let cached = cache
            .entry(template.to_string())
            .or_insert_with(|| Arc::clone(&wrapper));
        return Ok(Arc::clone(cached));
    }
    Ok(wrapper)
}

/// Drops every cached wrapper. Later calls compile afresh.
pub fn clear_compiled_wrappers() {
    if let Ok(mut cache) = compiled_wrappers().write() {
        cache.clear();
    }
}

/// What `crunch` accepts: script text, or raw bytes to be decoded as text by
/// the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Bytes(Vec<u8>),
}

impl Payload {
    /// The bytes the bootstrap must inflate to with `decoding`, or `None` if
    /// that decoding cannot reproduce this payload.
    pub fn encode(&self, decoding: Decoding) -> Option<Vec<u8>> {
        match (self, decoding) {
            (Payload::Text(text), Decoding::CharCode) => latin1_from_str(text),
            (Payload::Text(text), Decoding::Text) => Some(text.as_bytes().to_vec()),
            // Bytes are UTF-8 as far as the caller knows. Only ASCII means the
            // same thing one char per byte.
            (Payload::Bytes(bytes), Decoding::CharCode) => bytes.is_ascii().then(|| bytes.clone()),
            (Payload::Bytes(bytes), Decoding::Text) => Some(bytes.clone()),
        }
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<&[u8]> for Payload {
    fn from(bytes: &[u8]) -> Self {
        Payload::Bytes(bytes.to_vec())
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Bytes(bytes)
    }
}

/// Turns scripts into self-extracting HTML documents.
///
/// The lead-in only depends on the wrapper template and the lead-in
/// preference, so it is searched once per engine.
pub struct FetchCrunch<C, D> {
    config: CrunchConfig,
    compressor: C,
    decompressor: D,
    lead_in: Mutex<Option<Arc<LeadIn>>>,
}

impl<C: Compressor, D: Decompressor> FetchCrunch<C, D> {
    pub fn new(config: CrunchConfig, compressor: C, decompressor: D) -> Self {
        Self {
            config,
            compressor,
            decompressor,
            lead_in: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &CrunchConfig {
        &self.config
    }

    pub fn compressor(&self) -> &C {
        &self.compressor
    }

    fn lead_in(&self, wrapper: &CompiledWrapper) -> Result<Arc<LeadIn>, CrunchError> {
        let mut memo = match self.lead_in.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(lead_in) = memo.as_ref() {
            return Ok(Arc::clone(lead_in));
        }

        let lead_in = Arc::new(generate_lead_in(
            &wrapper.head(),
            &self.decompressor,
            self.config.lead_in_preference,
        )?);
        tracing::debug!(
            bytes = lead_in.bytes().len(),
            junk = lead_in.decompressed_len(),
            "found lead-in"
        );
        *memo = Some(Arc::clone(&lead_in));
        Ok(lead_in)
    }

    /// Builds the smallest document that inflates to `payload` after its first
    /// line and runs it when opened as HTML.
    #[tracing::instrument(level = "info", skip_all, fields(template = %self.config.template))]
    pub async fn crunch(&self, payload: impl Into<Payload>) -> Result<Vec<u8>, CrunchError> {
        let payload = payload.into();
        let wrapper = compiled_wrapper(&self.config.template)?;
        let lead_in = self.lead_in(&wrapper)?;
        let options = self.config.bootstrap_options();

        for decoding in Decoding::ALL {
            let Some(encoded) = payload.encode(decoding) else {
                tracing::trace!(?decoding, "payload cannot be decoded this way");
                continue;
            };

            let bootstrap = bootstrap_template(decoding, wrapper.reserved_identifiers(), options)?;
            let templates = wrapper.templates(bootstrap)?;
            let mid = resolve(ByteTemplate::try_from(&templates.mid)?, &encoded);
            let tail = resolve(ByteTemplate::try_from(&templates.tail)?, &encoded);

            let budget = match decoding {
                Decoding::CharCode => Some(self.config.max_call_stack_size),
                Decoding::Text => None,
            };
            let assembler = Assembler::new(&self.compressor, &self.decompressor, self.config.iterations)
                .with_max_decompressed_len(budget);
            let parts = AssemblyParts {
                lead_in: &lead_in,
                bootstrap: &mid,
                tail: &tail,
                payload: &encoded,
            };

            match assembler.assemble(parts).await {
                Ok(document) => {
                    tracing::info!(
                        ?decoding,
                        payload = encoded.len(),
                        size = document.len(),
                        "crunched"
                    );
                    return Ok(document);
                }
                Err(AssemblyError::Exhausted) => {
                    tracing::debug!(?decoding, "no valid document with this decoding");
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(AssemblyError::Exhausted.into())
    }
}

#[cfg(feature = "flate2")]
mod flate_engine {
    use super::*;
    use crate::adapters::flate::FlateCodec;

    impl FetchCrunch<FlateCodec, FlateCodec> {
        pub fn with_config(config: CrunchConfig) -> Self {
            let codec = FlateCodec::new();
            Self::new(config, codec.clone(), codec)
        }
    }

    impl Default for FetchCrunch<FlateCodec, FlateCodec> {
        fn default() -> Self {
            Self::with_config(CrunchConfig::default())
        }
    }

    /// [`FetchCrunch::crunch`] with the default configuration.
    pub async fn crunch(payload: impl Into<Payload>) -> Result<Vec<u8>, CrunchError> {
        FetchCrunch::<FlateCodec, FlateCodec>::default().crunch(payload).await
    }
}

#[cfg(feature = "flate2")]
pub use flate_engine::crunch;
