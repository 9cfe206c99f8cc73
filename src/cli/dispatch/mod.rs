//! Map validated CLI matches to an [`Action`].
//!
//! Running without a subcommand is the same as `server`.

use crate::api::handlers::TrustedProxies;
use crate::cli::actions::{Action, limits, quota, server};
use crate::cli::commands::{self, mfa, store};
use crate::cli::globals::GlobalArgs;
use crate::ratelimit::ActionKind;
use anyhow::{Context, Result, anyhow};
use secrecy::SecretString;

/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let globals = GlobalArgs::new(store::Options::parse(matches)?);

    match matches.subcommand() {
        Some((commands::CMD_LIMITS, _)) => Ok(Action::Limits(limits::Args {
            rate_limits: globals.rate_limits,
        })),
        Some((commands::CMD_QUOTA, sub)) => {
            let name = sub
                .get_one::<String>("action")
                .context("missing required argument: <action>")?;
            let kind = ActionKind::from_name(name)
                .ok_or_else(|| anyhow!("unknown rate limit action `{name}`"))?;
            let identity = sub
                .get_one::<String>("identity")
                .cloned()
                .context("missing required argument: <identity>")?;
            let mode = if sub.get_flag("reset") {
                quota::Mode::Reset
            } else {
                sub.get_one::<u64>("consume")
                    .copied()
                    .map_or(quota::Mode::Check, quota::Mode::Consume)
            };
            Ok(Action::Quota(quota::Args {
                globals,
                kind,
                identity,
                mode,
            }))
        }
        _ => {
            let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
            let dsn = matches
                .get_one::<String>("dsn")
                .cloned()
                .context("missing required argument: --dsn")?;
            let trusted_proxies = matches
                .get_one::<usize>("trusted-proxies")
                .copied()
                .unwrap_or(0);
            Ok(Action::Server(server::Args {
                port,
                dsn: SecretString::from(dsn),
                proxies: TrustedProxies::new(trusted_proxies),
                globals,
                mfa: mfa::parse(matches)?,
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clean_env<F: FnOnce()>(f: F) {
        temp_env::with_vars(
            [
                ("CAMPFYRE_DSN", None::<&str>),
                ("CAMPFYRE_RATE_LIMITS", None),
                ("CAMPFYRE_MFA_SECRET_LENGTH", None),
                ("CAMPFYRE_TRUSTED_PROXIES", None),
            ],
            f,
        );
    }

    #[test]
    fn server_requires_dsn() {
        clean_env(|| {
            let matches = commands::new().get_matches_from(vec!["campfyre-guard", "server"]);
            let result = handler(&matches);
            assert!(result.is_err());
            if let Err(err) = result {
                assert!(err.to_string().contains("missing required argument: --dsn"));
            }
        });
    }

    #[test]
    fn server_is_the_default() {
        clean_env(|| {
            let matches = commands::new().get_matches_from(vec![
                "campfyre-guard",
                "--dsn",
                "postgres://guard@localhost:5432/campfyre",
                "--port",
                "9000",
            ]);
            let action = handler(&matches);
            assert!(matches!(action, Ok(Action::Server(ref args)) if args.port == 9000));
        });
    }

    #[test]
    fn server_carries_trusted_proxies() {
        clean_env(|| {
            let parse = |extra: &[&str]| {
                let mut argv = vec![
                    "campfyre-guard",
                    "--dsn",
                    "postgres://guard@localhost:5432/campfyre",
                ];
                argv.extend_from_slice(extra);
                match handler(&commands::new().get_matches_from(argv)) {
                    Ok(Action::Server(args)) => args.proxies.hops(),
                    other => panic!("unexpected dispatch result: {other:?}"),
                }
            };
            assert_eq!(parse(&[]), 0);
            assert_eq!(parse(&["--trusted-proxies", "2"]), 2);
        });
    }

    #[test]
    fn short_secrets_are_rejected() {
        clean_env(|| {
            let matches = commands::new().get_matches_from(vec![
                "campfyre-guard",
                "--dsn",
                "postgres://guard@localhost:5432/campfyre",
                "--mfa-secret-length",
                "10",
            ]);
            assert!(handler(&matches).is_err());
        });
    }

    #[test]
    fn limits_applies_overrides() {
        clean_env(|| {
            let matches = commands::new().get_matches_from(vec![
                "campfyre-guard",
                "--rate-limits",
                "use_invite=10/60",
                "limits",
            ]);
            match handler(&matches) {
                Ok(Action::Limits(args)) => {
                    assert_eq!(args.rate_limits.get(ActionKind::UseInvite).limit, 10);
                }
                other => panic!("unexpected dispatch result: {other:?}"),
            }
        });
    }

    #[test]
    fn invalid_overrides_fail_fast() {
        clean_env(|| {
            let matches = commands::new().get_matches_from(vec![
                "campfyre-guard",
                "--rate-limits",
                "use_invite=0/60",
                "limits",
            ]);
            assert!(handler(&matches).is_err());
        });
    }

    #[test]
    fn quota_modes() {
        clean_env(|| {
            let parse = |extra: &[&str]| {
                let mut argv = vec!["campfyre-guard", "quota", "USER-LOGIN", "10.0.0.1"];
                argv.extend_from_slice(extra);
                match handler(&commands::new().get_matches_from(argv)) {
                    Ok(Action::Quota(args)) => {
                        assert_eq!(args.kind, ActionKind::UserLogin);
                        assert_eq!(args.identity, "10.0.0.1");
                        args.mode
                    }
                    other => panic!("unexpected dispatch result: {other:?}"),
                }
            };
            assert_eq!(parse(&[]), quota::Mode::Check);
            assert_eq!(parse(&["--consume", "3"]), quota::Mode::Consume(3));
            assert_eq!(parse(&["--reset"]), quota::Mode::Reset);
        });
    }

    #[test]
    fn quota_rejects_unknown_actions() {
        clean_env(|| {
            let matches = commands::new().get_matches_from(vec![
                "campfyre-guard",
                "quota",
                "launch_rocket",
                "10.0.0.1",
            ]);
            let result = handler(&matches);
            assert!(result.is_err());
            if let Err(err) = result {
                assert!(err.to_string().contains("launch_rocket"));
            }
        });
    }
}
