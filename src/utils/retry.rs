use tracing::{debug, warn};

/// Run `operation` until it succeeds, retrying immediately on failure.
///
/// `max_retries` counts retries after the first attempt, so at most
/// `max_retries + 1` attempts are made. Once the budget is spent the last
/// error is returned.
pub async fn retry_async<F, Fut, T, E>(mut operation: F, max_retries: u32) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut retries: u32 = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if retries > 0 {
                    debug!("✅ Success after {retries} retries");
                }
                return Ok(result);
            }
            Err(e) if retries >= max_retries => {
                if max_retries > 0 {
                    warn!("🚫 Maximum retries ({max_retries}) reached, stopping retries: {e}");
                }
                return Err(e);
            }
            Err(e) => {
                retries += 1;
                warn!("❌ Attempt {retries} failed, retrying: {e}");
            }
        }
    }
}
