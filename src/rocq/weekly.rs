//! Weekly snapshot selection
//!
//! A weekly build installs the last commit made before Monday 00:00 US
//! Central time. The same cutoff dates the weekly cache key, so both must
//! come from [`monday_cutoff`].

use crate::error::SetupResult;
use crate::process::CommandRunner;
use chrono::{DateTime, Datelike, NaiveTime, SecondsFormat, TimeDelta, Utc};
use std::path::{Path, PathBuf};
use tracing::info;

/// Hour (UTC) standing in for US Central midnight. Fixed UTC-6, no DST.
pub const CUTOFF_HOUR_UTC: i64 = 6;

/// Ref whose history is searched for the snapshot commit
pub const TRACKED_REF: &str = "origin/HEAD";

/// History depth fetched for a fresh clone, in days
pub const SHALLOW_SINCE_DAYS: i64 = 8;

/// Depth used when git refuses `--shallow-since`
pub const FALLBACK_DEPTH: u32 = 50;

/// git exits with 128 when a shallow-since clone finds nothing to fetch
const GIT_FATAL_EXIT: i32 = 128;

/// A resolved weekly snapshot of one repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeeklyCommitSelection {
    pub repo_url: String,
    pub clone_path: PathBuf,
    pub cutoff: DateTime<Utc>,
    pub commit: String,
}

impl WeeklyCommitSelection {
    /// opam pin target for this snapshot (`git+file://<clone>#<hash>`)
    pub fn pin_target(&self) -> String {
        format!("git+file://{}#{}", self.clone_path.display(), self.commit)
    }
}

/// Most recent Monday 06:00 UTC at or before `now`.
///
/// Sunday belongs to the week that started six days earlier.
pub fn monday_cutoff(now: DateTime<Utc>) -> DateTime<Utc> {
    let weekday = i64::from(now.weekday().num_days_from_sunday());
    let days_to_monday = if weekday == 0 { -6 } else { 1 - weekday };

    let monday = now.date_naive() + TimeDelta::days(days_to_monday);
    let cutoff = (monday.and_time(NaiveTime::MIN) + TimeDelta::hours(CUTOFF_HOUR_UTC)).and_utc();

    if cutoff > now {
        cutoff - TimeDelta::days(7)
    } else {
        cutoff
    }
}

/// `YYYY-MM-DD` of the cutoff, the weekly cache key component
pub fn cutoff_date(now: DateTime<Utc>) -> String {
    monday_cutoff(now).format("%Y-%m-%d").to_string()
}

/// Cutoff as passed to `git log --before`
fn cutoff_timestamp(cutoff: DateTime<Utc>) -> String {
    cutoff.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Fetch an existing clone, or make a fresh history-only clone
pub async fn clone_or_update(
    runner: &dyn CommandRunner,
    url: &str,
    path: &Path,
    now: DateTime<Utc>,
) -> SetupResult<()> {
    let path_arg = path.to_string_lossy();

    if path.exists() {
        info!("Updating repository at {}", path.display());
        return runner.run("git", &["-C", &path_arg, "fetch", "origin"]).await;
    }

    info!("Cloning {} to {}", url, path.display());
    let since = format!(
        "--shallow-since={}",
        (now - TimeDelta::days(SHALLOW_SINCE_DAYS)).format("%Y-%m-%d")
    );
    match runner
        .run("git", &["clone", "--no-checkout", &since, url, &path_arg])
        .await
    {
        Err(e) if e.exit_code() == Some(GIT_FATAL_EXIT) => {
            info!("Shallow clone by date failed, retrying with depth {}", FALLBACK_DEPTH);
            let depth = format!("--depth={}", FALLBACK_DEPTH);
            runner
                .run("git", &["clone", "--no-checkout", &depth, url, &path_arg])
                .await
        }
        other => other,
    }
}

/// Last commit on [`TRACKED_REF`] before the Monday cutoff.
///
/// A repository with no history before the cutoff falls back to the tip.
pub async fn resolve_monday_commit(
    runner: &dyn CommandRunner,
    repo: &Path,
    now: DateTime<Utc>,
) -> SetupResult<String> {
    let repo_arg = repo.to_string_lossy();
    let cutoff = cutoff_timestamp(monday_cutoff(now));
    info!("Finding commit before Monday midnight CT: {}", cutoff);

    let before = format!("--before={}", cutoff);
    let found = runner
        .output(
            "git",
            &["-C", &repo_arg, "log", "-1", &before, "--format=%H", TRACKED_REF],
        )
        .await?;

    let commit = match found.trim() {
        "" => {
            info!("No commit before {}, using the branch tip", cutoff);
            runner
                .output("git", &["-C", &repo_arg, "rev-parse", TRACKED_REF])
                .await?
                .trim()
                .to_string()
        }
        hash => hash.to_string(),
    };

    runner
        .run("git", &["-C", &repo_arg, "log", "-1", &commit, "--format=%ci - %s"])
        .await?;
    Ok(commit)
}

/// Clone or update `url` at `path` and pin it to this week's commit
pub async fn select_weekly_commit(
    runner: &dyn CommandRunner,
    url: &str,
    path: &Path,
    now: DateTime<Utc>,
) -> SetupResult<WeeklyCommitSelection> {
    clone_or_update(runner, url, path, now).await?;
    let commit = resolve_monday_commit(runner, path, now).await?;

    Ok(WeeklyCommitSelection {
        repo_url: url.to_string(),
        clone_path: path.to_path_buf(),
        cutoff: monday_cutoff(now),
        commit,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::fake::FakeRunner;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn cutoff_at_exactly_monday_six_is_same_instant() {
        let now = at(2026, 10, 12, 6, 0);
        assert_eq!(monday_cutoff(now), now);
    }

    #[test]
    fn just_before_cutoff_belongs_to_previous_week() {
        assert_eq!(monday_cutoff(at(2026, 10, 12, 5, 59)), at(2026, 10, 5, 6, 0));
    }

    #[test]
    fn sunday_maps_back_six_days() {
        assert_eq!(monday_cutoff(at(2026, 10, 18, 23, 59)), at(2026, 10, 12, 6, 0));
        assert_eq!(monday_cutoff(at(2026, 10, 11, 12, 0)), at(2026, 10, 5, 6, 0));
    }

    #[test]
    fn whole_week_shares_one_cutoff() {
        let expected = at(2026, 10, 12, 6, 0);
        for day in 12..=18 {
            assert_eq!(monday_cutoff(at(2026, 10, day, 12, 0)), expected, "day {}", day);
        }
        assert_eq!(cutoff_date(at(2026, 10, 16, 9, 30)), "2026-10-12");
    }

    #[test]
    fn next_week_is_seven_days_later() {
        let this_week = monday_cutoff(at(2026, 10, 18, 23, 59));
        let next_week = monday_cutoff(at(2026, 10, 19, 6, 0));
        assert_eq!(next_week - this_week, TimeDelta::days(7));
    }

    #[test]
    fn crosses_month_boundary() {
        assert_eq!(cutoff_date(at(2026, 3, 1, 12, 0)), "2026-02-23");
    }

    #[test]
    fn git_timestamp_has_millis_and_z() {
        assert_eq!(cutoff_timestamp(at(2026, 10, 12, 6, 0)), "2026-10-12T06:00:00.000Z");
    }

    #[tokio::test]
    async fn resolves_commit_before_cutoff() {
        let runner = FakeRunner::new();
        runner.stdout("git -C /r log -1", "abc123\n");

        let commit = resolve_monday_commit(&runner, Path::new("/r"), at(2026, 10, 16, 0, 0))
            .await
            .unwrap();

        assert_eq!(commit, "abc123");
        let calls = runner.calls();
        assert_eq!(
            calls[0],
            "git -C /r log -1 --before=2026-10-12T06:00:00.000Z --format=%H origin/HEAD"
        );
        assert_eq!(calls[1], "git -C /r log -1 abc123 --format=%ci - %s");
        assert_eq!(runner.count("git -C /r rev-parse"), 0);
    }

    #[tokio::test]
    async fn falls_back_to_tip_without_history() {
        let runner = FakeRunner::new();
        runner.stdout("git -C /r rev-parse origin/HEAD", "fff000\n");

        let commit = resolve_monday_commit(&runner, Path::new("/r"), at(2026, 10, 16, 0, 0))
            .await
            .unwrap();

        assert_eq!(commit, "fff000");
        assert_eq!(runner.count("git -C /r rev-parse"), 1);
    }

    #[tokio::test]
    async fn fresh_clone_retries_with_depth_on_128() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rocq");
        let runner = FakeRunner::new();
        runner.exit_once("git clone", 128);

        clone_or_update(&runner, "https://example.org/rocq", &path, at(2026, 10, 16, 0, 0))
            .await
            .unwrap();

        let clones = runner.calls_starting_with("git clone");
        assert_eq!(clones.len(), 2);
        assert!(clones[0].contains("--shallow-since=2026-10-08"));
        assert!(clones[1].contains("--depth=50"));
    }

    #[tokio::test]
    async fn other_clone_failures_propagate() {
        let dir = TempDir::new().unwrap();
        let runner = FakeRunner::new();
        runner.exit("git clone", 1);

        let err = clone_or_update(&runner, "u", &dir.path().join("x"), Utc::now())
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), Some(1));
        assert_eq!(runner.count("git clone"), 1);
    }

    #[tokio::test]
    async fn existing_clone_is_fetched() {
        let dir = TempDir::new().unwrap();
        let runner = FakeRunner::new();

        clone_or_update(&runner, "u", dir.path(), Utc::now()).await.unwrap();

        assert_eq!(
            runner.calls(),
            vec![format!("git -C {} fetch origin", dir.path().display())]
        );
    }

    #[tokio::test]
    async fn selection_builds_file_pin_target() {
        let dir = TempDir::new().unwrap();
        let runner = FakeRunner::new();
        runner.stdout("git -C", "deadbeef\n");

        let selection = select_weekly_commit(&runner, "u", dir.path(), at(2026, 10, 16, 0, 0))
            .await
            .unwrap();

        assert_eq!(selection.cutoff, at(2026, 10, 12, 6, 0));
        assert_eq!(
            selection.pin_target(),
            format!("git+file://{}#deadbeef", dir.path().display())
        );
    }
}
