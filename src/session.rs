use std::time::Duration;

use tracing::info;

use crate::browser::BrowsingContext;
use crate::db::Credentials;
use crate::error::CrawlError;

const USER_FIELD: &[&str] = &[r#"input[name="usuario"]"#, r#"input[type="text"]"#];
const PASS_FIELD: &[&str] = &[r#"input[type="password"]"#];
const SUBMIT: &[&str] = &[r#"input[type="submit"]"#, r#"button[type="submit"]"#];

/// Submit `creds` through the portal's login form.
///
/// The portal has no reliable post-login marker, so success is assumed once
/// the form was submitted and `settle` has elapsed.
pub async fn login<B: BrowsingContext + ?Sized>(
    ctx: &mut B,
    login_url: &str,
    creds: &Credentials,
    settle: Duration,
) -> Result<(), CrawlError> {
    info!(url = login_url, "Opening login page");
    ctx.goto(login_url)
        .await
        .map_err(|e| CrawlError::Authentication(format!("login page unreachable: {}", e)))?;

    require(ctx.fill(USER_FIELD, &creds.user).await, "username field")?;
    require(ctx.fill(PASS_FIELD, &creds.pass).await, "password field")?;
    require(ctx.click(SUBMIT).await, "submit control")?;

    ctx.settle(settle).await;
    info!(user = %creds.user, "Login submitted");
    Ok(())
}

fn require(
    found: Result<bool, crate::browser::BrowserError>,
    what: &str,
) -> Result<(), CrawlError> {
    match found {
        Ok(true) => Ok(()),
        Ok(false) => Err(CrawlError::Authentication(format!("no {} on login page", what))),
        Err(e) => Err(CrawlError::Authentication(format!("{}: {}", what, e))),
    }
}
