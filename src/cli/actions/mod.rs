pub mod limits;
pub mod quota;
pub mod server;

// The match over variants lives in `run` so this file only declares the shape.
mod run;

#[derive(Debug)]
pub enum Action {
    Server(server::Args),
    Limits(limits::Args),
    Quota(quota::Args),
}

impl Action {
    /// Execute the action.
    /// # Errors
    /// Returns an error if the action fails.
    pub async fn execute(self) -> anyhow::Result<()> {
        run::execute(self).await
    }
}
