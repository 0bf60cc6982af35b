//! Startup wiring for the terminal client.

use std::sync::Arc;

use rendezvous_app::Runtime;
use rendezvous_client::{MessagingApi, TokenStore};
use rendezvous_proto::ConversationId;

use crate::{CliError, ClientConfig, FileTokenStore, RestClient, SystemEnv, Target, TerminalDriver};

/// Resolve the conversation, then run the chat session until `/quit` or end
/// of input.
pub async fn run(config: ClientConfig) -> Result<(), CliError> {
    let tokens = Arc::new(FileTokenStore::new(&config.token_file));
    if let Some(token) = &config.seed_token {
        tokens.set(token).await?;
        tracing::info!(path = %tokens.path().display(), "stored token");
    }

    let api = Arc::new(RestClient::new(&config.api_url, config.api_timeout, tokens.clone())?);
    let conversation = resolve_conversation(api.as_ref(), config.target).await?;
    tracing::info!(%conversation, "opening conversation");

    let driver = TerminalDriver::new(api, tokens);
    driver.read_stdin();

    let mut runtime = Runtime::new(driver, SystemEnv::new(), config.runtime);
    runtime.login().await?;
    runtime.open_conversation(conversation).await?;
    runtime.run().await?;
    Ok(())
}

async fn resolve_conversation(
    api: &dyn MessagingApi,
    target: Target,
) -> Result<ConversationId, CliError> {
    match target {
        Target::Conversation(id) => Ok(id),
        Target::User(user_id) => Ok(api.get_conversation_with_user(user_id).await?.id),
    }
}
