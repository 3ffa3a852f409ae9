use std::time::Duration;

use grantor::{transport::ReqwestTransportFactory, AuthConfig, Backend, HttpClient, TokenProvider};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,grantor=debug")),
        )
        .init();

    let client_id = std::env::var("CLIENT_ID").unwrap_or_else(|_| "my-client-id".to_string());
    let client_secret =
        std::env::var("CLIENT_SECRET").unwrap_or_else(|_| "my-client-secret".to_string());

    // Tokens are persisted under the user cache directory and reused by later runs.
    let config = AuthConfig::builder()
        .client_id(&client_id)
        .client_secret(&client_secret)
        .backend(Backend::keycloak(
            "https://identity.example.com",
            "my-realm",
            &["email", "profile"],
        )?)
        .write_to_file(true)
        .transport(std::sync::Arc::new(
            ReqwestTransportFactory::new().timeout(Duration::from_secs(10)),
        ))
        .build();

    let provider = config.token_provider()?;

    let token = provider.get_token()?;
    tracing::info!(
        "Obtained `{}` token for `{}`, valid until {}",
        token.token_type(),
        provider.client_id(),
        token.expires_at()
    );

    // Served from the cache until it comes within the expiry margin.
    let _again = provider.get_token()?;

    // A `401` from the API invalidates the token; the next request fetches a new one.
    let client = HttpClient::new(provider);
    let response = client.send(client.get("https://api.example.com/data"))?;
    tracing::info!("API responded with {}", response.status());

    Ok(())
}
