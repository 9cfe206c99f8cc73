use crate::ratelimit::RateLimits;
use anyhow::Result;
use std::{fmt::Write, sync::Arc};

#[derive(Debug)]
pub struct Args {
    pub rate_limits: Arc<RateLimits>,
}

/// Print the effective descriptor table.
/// # Errors
/// Never fails today; kept fallible like every other action.
pub fn execute(args: &Args) -> Result<()> {
    print!("{}", render(&args.rate_limits));
    Ok(())
}

fn render(limits: &RateLimits) -> String {
    let width = limits
        .iter()
        .map(|(kind, _)| kind.as_str().len())
        .max()
        .unwrap_or(0);

    let mut out = format!("{:<width$}  {:>6}  {:>8}\n", "action", "limit", "window");
    for (kind, descriptor) in limits.iter() {
        let _ = writeln!(
            out,
            "{:<width$}  {:>6}  {:>7}s",
            kind.as_str(),
            descriptor.limit,
            descriptor.window_seconds
        );
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::ratelimit::ActionKind;

    #[test]
    fn render_lists_every_action() {
        let table = render(&RateLimits::builtin());
        assert_eq!(table.lines().count(), ActionKind::ALL.len() + 1);
        assert!(table.lines().next().unwrap().starts_with("action"));
    }

    #[test]
    fn render_shows_overrides() {
        let limits = RateLimits::with_overrides("user_login=7/90").unwrap();
        let table = render(&limits);
        let line = table
            .lines()
            .find(|line| line.starts_with("user_login "))
            .unwrap();
        let columns: Vec<&str> = line.split_whitespace().collect();
        assert_eq!(columns, ["user_login", "7", "90s"]);
    }
}
