use crate::api;
use crate::api::handlers::auth::AuthConfig;
use crate::cli::actions::Action;
use anyhow::Result;

/// Handle the server action
pub async fn handle(action: Action) -> Result<()> {
    match action {
        Action::Server {
            port,
            dsn,
            frontend_url,
            notifier_url,
        } => {
            let auth_config = AuthConfig::new(frontend_url);
            api::serve(port, dsn, auth_config, notifier_url).await?;
        }
    }

    Ok(())
}
