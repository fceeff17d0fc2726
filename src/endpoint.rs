use reqwest::Url;

use crate::config::ClientConfig;
use crate::error::{ComfyError, Result};

/// Every route the client talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Endpoint<'a> {
    Embeddings,
    Extensions,
    Prompt,
    Interrupt,
    Free,
    History(Option<&'a str>),
    UploadImage,
    UploadMask,
    View,
    ViewMetadata(&'a str),
    SystemStats,
    ObjectInfo(Option<&'a str>),
    Queue,
    Ws,
}

impl<'a> Endpoint<'a> {
    /// Short name used in log lines and error contexts.
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Endpoint::Embeddings => "embeddings",
            Endpoint::Extensions => "extensions",
            Endpoint::Prompt => "prompt",
            Endpoint::Interrupt => "interrupt",
            Endpoint::Free => "free",
            Endpoint::History(_) => "history",
            Endpoint::UploadImage => "upload/image",
            Endpoint::UploadMask => "upload/mask",
            Endpoint::View => "view",
            Endpoint::ViewMetadata(_) => "view_metadata",
            Endpoint::SystemStats => "system_stats",
            Endpoint::ObjectInfo(_) => "object_info",
            Endpoint::Queue => "queue",
            Endpoint::Ws => "ws",
        }
    }

    fn segments(&self) -> Vec<&'a str> {
        match *self {
            Endpoint::UploadImage => vec!["upload", "image"],
            Endpoint::UploadMask => vec!["upload", "mask"],
            Endpoint::History(Some(id)) => vec!["history", id],
            Endpoint::ObjectInfo(Some(class)) => vec!["object_info", class],
            Endpoint::ViewMetadata(folder) => vec!["view_metadata", folder],
            other => vec![other.name()],
        }
    }

    /// Absolute HTTP URL carrying `clientId` followed by `params`.
    pub(crate) fn http_url(&self, config: &ClientConfig, params: &[(&str, &str)]) -> Result<Url> {
        self.build(config.http_scheme(), config, params)
    }

    /// Absolute WebSocket URL carrying `clientId`.
    pub(crate) fn ws_url(&self, config: &ClientConfig) -> Result<Url> {
        self.build(config.ws_scheme(), config, &[])
    }

    fn build(&self, scheme: &str, config: &ClientConfig, params: &[(&str, &str)]) -> Result<Url> {
        // Any path or query already on the address is kept; endpoint
        // segments go after the path, `clientId` after the query.
        let base = format!("{}://{}", scheme, config.server_address);
        let mut url = Url::parse(&base).map_err(|e| {
            ComfyError::InvalidConfig(format!("Bad server address {}: {}", config.server_address, e))
        })?;

        url.path_segments_mut()
            .map_err(|_| {
                ComfyError::InvalidConfig(format!(
                    "Server address {} cannot carry a path",
                    config.server_address
                ))
            })?
            .pop_if_empty()
            .extend(self.segments());

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("clientId", &config.client_id);
            for (key, value) in params {
                query.append_pair(key, value);
            }
        }

        Ok(url)
    }
}
