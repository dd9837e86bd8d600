use crate::cli::actions::Action;
use anyhow::Result;

pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    Ok(Action::Server {
        port: matches.get_one::<u16>("port").copied().unwrap_or(8080),
        dsn: matches
            .get_one("dsn")
            .map(|s: &String| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("missing required argument: --dsn"))?,
        frontend_url: matches
            .get_one("frontend-url")
            .map(|s: &String| s.to_string())
            .unwrap_or_else(|| "http://localhost:3000".to_string()),
        notifier_url: matches
            .get_one("notifier-url")
            .map(|s: &String| s.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands;

    #[test]
    fn handler_builds_server_action() {
        let matches = commands::new().get_matches_from(vec![
            "gardi",
            "--dsn",
            "postgres://localhost:5432/gardi",
            "--frontend-url",
            "https://chat.example.com",
            "--notifier-url",
            "https://hooks.example.com/reset",
        ]);

        let action = handler(&matches).expect("action");
        let Action::Server {
            port,
            dsn,
            frontend_url,
            notifier_url,
        } = action;
        assert_eq!(port, 8080);
        assert_eq!(dsn, "postgres://localhost:5432/gardi");
        assert_eq!(frontend_url, "https://chat.example.com");
        assert_eq!(
            notifier_url.as_deref(),
            Some("https://hooks.example.com/reset")
        );
    }
}
