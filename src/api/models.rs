use crate::api::ModelsResponse;
use crate::utils::url::construct_api_url;

/// Lists the models the server advertises on `GET {api_url}/models`.
pub async fn fetch_models(
    client: &reqwest::Client,
    api_url: &str,
) -> Result<ModelsResponse, Box<dyn std::error::Error + Send + Sync>> {
    let models_url = construct_api_url(api_url, "models");
    let response = client
        .get(models_url)
        .header("Accept", "application/json")
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status();
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(format!("API request failed with status {status}: {error_text}").into());
    }

    let models_response = response.json::<ModelsResponse>().await?;
    Ok(models_response)
}

/// Sorts models by id so listings are stable between refreshes.
pub fn sort_models(models: &mut [crate::api::ModelInfo]) {
    models.sort_by(|a, b| a.id.cmp(&b.id));
}
