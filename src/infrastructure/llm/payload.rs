//! Request payload helpers shared by every vendor

use serde_json::{Map, Value};

use crate::domain::{ChatRequest, ProviderConfig};

/// Generation parameters after applying configuration defaults
///
/// A field that is still `None` must be left out of the payload.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct GenerationParams {
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
}

impl GenerationParams {
    pub(crate) fn resolve(request: &ChatRequest, config: &ProviderConfig) -> Self {
        Self {
            temperature: request
                .temperature
                .or(config.model_parameters.temperature),
            max_tokens: request.max_tokens.or(config.model_parameters.max_tokens),
        }
    }
}

/// Shallow-merge configuration extras, then request extras, into `body`
///
/// Runs last so caller overrides win over derived fields.
pub(crate) fn merge_extra_params(
    body: &mut Map<String, Value>,
    config: &ProviderConfig,
    request: &ChatRequest,
) {
    for (key, value) in config
        .model_parameters
        .extra
        .iter()
        .chain(request.extra_params.iter())
    {
        body.insert(key.clone(), value.clone());
    }
}

/// Vendor headers followed by the configuration's custom headers
///
/// A custom header replaces a vendor header of the same name.
pub(crate) fn with_custom_headers<'a>(
    base: Vec<(&'a str, &'a str)>,
    config: &'a ProviderConfig,
) -> Vec<(&'a str, &'a str)> {
    let mut headers: Vec<(&str, &str)> = base
        .into_iter()
        .filter(|(name, _)| {
            !config
                .custom_headers
                .keys()
                .any(|custom| custom.eq_ignore_ascii_case(name))
        })
        .collect();

    headers.extend(
        config
            .custom_headers
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str())),
    );
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ProviderKind;
    use serde_json::json;

    #[test]
    fn test_request_params_take_priority() {
        let config = ProviderConfig::new("a", ProviderKind::OpenAi)
            .with_temperature(0.2)
            .with_max_tokens(500);
        let request = ChatRequest::builder().user("hi").temperature(0.9).build();

        let params = GenerationParams::resolve(&request, &config);
        assert_eq!(params.temperature, Some(0.9));
        assert_eq!(params.max_tokens, Some(500));
    }

    #[test]
    fn test_absent_params_stay_absent() {
        let config = ProviderConfig::new("a", ProviderKind::OpenAi);
        let request = ChatRequest::builder().user("hi").build();

        assert_eq!(
            GenerationParams::resolve(&request, &config),
            GenerationParams::default()
        );
    }

    #[test]
    fn test_request_extras_win() {
        let config = ProviderConfig::new("a", ProviderKind::OpenAi)
            .with_model_param("top_p", 0.5)
            .with_model_param("seed", 1);
        let request = ChatRequest::builder()
            .user("hi")
            .extra_param("top_p", 0.9)
            .build();

        let mut body = Map::new();
        body.insert("top_p".into(), json!(0.1));
        merge_extra_params(&mut body, &config, &request);

        assert_eq!(body["top_p"], json!(0.9));
        assert_eq!(body["seed"], json!(1));
    }

    #[test]
    fn test_custom_headers_replace_vendor_headers() {
        let config = ProviderConfig::new("a", ProviderKind::OpenAi)
            .with_header("content-type", "application/json; charset=utf-8")
            .with_header("X-Org", "acme");

        let headers = with_custom_headers(
            vec![("Authorization", "Bearer k"), ("Content-Type", "application/json")],
            &config,
        );

        assert_eq!(headers.len(), 3);
        assert!(headers.contains(&("Authorization", "Bearer k")));
        assert!(headers.contains(&("content-type", "application/json; charset=utf-8")));
        assert!(headers.contains(&("X-Org", "acme")));
    }
}
