//! Daily removal of never-activated registrations

use chrono::{Duration, Local, NaiveDateTime, NaiveTime};
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::user::UserService;

/// Next occurrence of `at` strictly after `now`
pub fn next_run_after(now: NaiveDateTime, at: NaiveTime) -> NaiveDateTime {
    let today = now.date().and_time(at);
    if today > now {
        today
    } else {
        today + Duration::days(1)
    }
}

/// Spawn the cleanup loop; it runs every day at `hour:00` local time
pub fn spawn_cleanup_task(service: UserService, hour: u32) -> JoinHandle<()> {
    let at = NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or(NaiveTime::MIN);

    tokio::spawn(async move {
        info!("Stale registration cleanup scheduled daily at {}", at);

        loop {
            let now = Local::now().naive_local();
            let wait = (next_run_after(now, at) - now)
                .to_std()
                .unwrap_or(std::time::Duration::from_secs(60));
            tokio::time::sleep(wait).await;

            match service.remove_not_activated_users().await {
                Ok(count) => info!("Cleanup removed {} not activated users", count),
                Err(e) => error!("Cleanup of not activated users failed: {}", e),
            }
        }
    })
}
