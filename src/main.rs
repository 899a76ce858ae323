use anyhow::Context;
use lambda_auth_proxy::config::ProxyConfig;
use lambda_auth_proxy::logging;
use lambda_auth_proxy::proxy::{Proxy, function_handler};
use lambda_runtime::{Error, LambdaEvent, service_fn};

#[tokio::main]
async fn main() -> Result<(), Error> {
    let config = ProxyConfig::from_env()
        .context("failed to load proxy configuration")?;
    logging::init(&config.log_level)?;

    // One client per instance so warm invocations reuse connections
    let proxy = Proxy::new(&config)
        .context("failed to build the upstream HTTP client")?;
    let proxy = &proxy;

    lambda_runtime::run(service_fn(move |event: LambdaEvent<_>| async move {
        function_handler(proxy, event).await
    }))
    .await
}
