//! Transport to the language model
//!
//! Everything above this module talks to a [`CompletionClient`]; which concrete
//! client backs it is decided once, by [`create_client`].

mod client;
mod openai;
mod service;

#[cfg(test)]
pub(crate) use client::TextStream;
#[cfg(test)]
pub(crate) use service::test_server;

pub use client::{CompletionClient, CompletionRequest};
pub use openai::{OpenAiClient, OPENAI_API_BASE};
pub use service::{ServiceClient, DEFAULT_SERVICE_URL};

use tracing::{info, warn};

use crate::config::{api_key_from_env, ClientKind, ResolvedModelConfig, API_KEY_ENV};
use crate::error::{Result, WikiError};

/// Where completion requests go
#[derive(Debug, Clone)]
pub enum Backend {
    /// The repository-aware completion service at `base_url`
    Service { base_url: String },

    /// The provider's API, called directly with the resolved parameters
    Direct,
}

/// Factory function to create the completion client for a backend
pub fn create_client(backend: &Backend, model_config: &ResolvedModelConfig) -> Result<Box<dyn CompletionClient>> {
    match backend {
        Backend::Service { base_url } => {
            info!("Using completion service at {}", base_url);
            Ok(Box::new(ServiceClient::new(base_url)))
        }
        Backend::Direct => {
            let api_key = api_key_from_env().ok_or_else(|| {
                WikiError::Config(format!("{} is required when calling the provider directly", API_KEY_ENV))
            })?;

            match model_config.client {
                ClientKind::OpenAi => {}
                ClientKind::Fallback => {
                    warn!("No registered client for this provider, using the OpenAI-compatible client");
                }
            }

            info!(
                "Calling {} directly with model {} ({})",
                OPENAI_API_BASE,
                model_config.model,
                model_config.client.class_name()
            );
            Ok(Box::new(OpenAiClient::new(OPENAI_API_BASE, api_key, model_config.clone())))
        }
    }
}
