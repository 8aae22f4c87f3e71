use crate::json::JsonError;

#[derive(Debug, thiserror::Error)]
pub enum IntegrationError {
    #[error("{service} request failed")]
    Http {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{service} returned {status}: {body}")]
    Api {
        service: &'static str,
        status: u16,
        body: String,
    },
    #[error("unexpected {service} response: {source}")]
    Decode {
        service: &'static str,
        #[source]
        source: JsonError,
    },
    #[error("failed to sign service account token")]
    Signing(#[from] jsonwebtoken::errors::Error),
    #[error("{0} returned no content")]
    Empty(&'static str),
}

impl IntegrationError {
    pub(crate) fn http(service: &'static str) -> impl FnOnce(reqwest::Error) -> Self {
        move |source| IntegrationError::Http { service, source }
    }
}

/// Read a response body, turning non-2xx statuses into [`IntegrationError::Api`].
pub(crate) async fn read_body(
    service: &'static str,
    resp: reqwest::Response,
) -> Result<String, IntegrationError> {
    let status = resp.status();
    let body = resp.text().await.map_err(IntegrationError::http(service))?;
    if !status.is_success() {
        return Err(IntegrationError::Api {
            service,
            status: status.as_u16(),
            body,
        });
    }
    Ok(body)
}

/// Read and decode a JSON response body.
pub(crate) async fn read_json<T: serde::de::DeserializeOwned>(
    service: &'static str,
    resp: reqwest::Response,
) -> Result<T, IntegrationError> {
    let body = read_body(service, resp).await?;
    crate::json::parse_json(&body).map_err(|source| IntegrationError::Decode { service, source })
}
