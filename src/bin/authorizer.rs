use anyhow::Context;
use lambda_auth_proxy::authorizer::{Authorizer, function_handler};
use lambda_auth_proxy::config::AuthorizerConfig;
use lambda_auth_proxy::logging;
use lambda_auth_proxy::secrets::SsmSecretStore;
use lambda_runtime::{Error, LambdaEvent, service_fn};
use serde_json::Value;

#[tokio::main]
async fn main() -> Result<(), Error> {
    let config = AuthorizerConfig::from_env()
        .context("failed to load authorizer configuration")?;
    logging::init(&config.log_level)?;

    // The secret cache lives as long as the warm instance
    let store = SsmSecretStore::from_env().await;
    let authorizer = Authorizer::new(store, config.parameter_prefix);
    let authorizer = &authorizer;

    lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| async move {
        function_handler(authorizer, event).await
    }))
    .await
}
