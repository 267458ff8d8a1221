//! Processed data retrieval
//!
//! The instrument writes processed files into one directory per day,
//! `<root>/<YYYY>/<YYYYMM>/<YYYYMMDD>/`, with the start hour embedded in
//! each file name as `YYYYMMDD_HH`. Fetching for a time pulls every file of
//! that hour and of the hour before it.

use chrono::{Duration, NaiveDateTime};
use halo_steer_core::transport::{join_remote, with_session, Connector, RemoteSession, SessionSource};
use halo_steer_core::TransportError;

/// A downloaded data file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedFile {
    pub name: String,
    pub contents: Vec<u8>,
}

/// `YYYYMMDD_HH` stamp that names files started in the hour of `time`
pub fn hour_stamp(time: NaiveDateTime) -> String {
    time.format("%Y%m%d_%H").to_string()
}

/// Remote day directory holding files for `time`
pub fn day_dir(data_root: &str, time: NaiveDateTime) -> String {
    let dir = join_remote(data_root, &time.format("%Y/%Y%m/%Y%m%d").to_string());
    format!("{}/", dir)
}

/// Download all files from the hour of `time` and the hour before.
///
/// When the previous hour falls on the previous day, that day's directory
/// is searched as well; a missing previous-day directory is only logged.
/// No matching files is not an error: the result is empty.
pub fn fetch_recent_files<C: Connector>(
    connector: &C,
    source: SessionSource<'_, C::Session>,
    time: NaiveDateTime,
    data_root: &str,
) -> Result<Vec<FetchedFile>, TransportError> {
    let previous = time - Duration::hours(1);
    let stamps = [hour_stamp(time), hour_stamp(previous)];

    let mut dirs = vec![day_dir(data_root, time)];
    let previous_dir = day_dir(data_root, previous);
    if previous_dir != dirs[0] {
        dirs.push(previous_dir);
    }

    let files = with_session(connector, source, |session| {
        let mut files = Vec::new();
        for (i, dir) in dirs.iter().enumerate() {
            let names = match session.list_dir(dir) {
                Ok(names) => names,
                Err(e) if i > 0 => {
                    log::warn!("Skipping previous day: {}", e);
                    continue;
                }
                Err(e) => return Err(e),
            };
            for name in names {
                if !stamps.iter().any(|stamp| name.contains(stamp.as_str())) {
                    continue;
                }
                let remote_path = join_remote(dir, &name);
                log::info!("Retrieving {}", remote_path);
                let contents = session.get(&remote_path)?;
                files.push(FetchedFile { name, contents });
            }
        }
        Ok(files)
    })?;

    if files.is_empty() {
        log::warn!("No data files found for {}", time);
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use halo_steer_core::protocol::halo::DATA_ROOT;
    use halo_steer_core::transport::memory::MemoryConnector;
    use halo_steer_core::transport::Credentials;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    fn creds() -> Credentials {
        Credentials::new("lidar", "halo", "pw")
    }

    #[test]
    fn test_paths_and_stamps() {
        let t = at(2024, 6, 5, 9, 30);
        assert_eq!(hour_stamp(t), "20240605_09");
        assert_eq!(day_dir(DATA_ROOT, t), "/C:/Lidar/Data/Proc/2024/202406/20240605/");
    }

    #[test]
    fn test_fetches_current_and_previous_hour() {
        let connector = MemoryConnector::new();
        let dir = "/C:/Lidar/Data/Proc/2024/202406/20240605/";
        connector.insert_file(&format!("{}Stare_213_20240605_07.hpl", dir), b"old");
        connector.insert_file(&format!("{}Stare_213_20240605_08.hpl", dir), b"prev");
        connector.insert_file(&format!("{}User1_213_20240605_090012.hpl", dir), b"now");

        let files = fetch_recent_files(
            &connector,
            SessionSource::Connect(&creds()),
            at(2024, 6, 5, 9, 30),
            DATA_ROOT,
        )
        .unwrap();

        let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["Stare_213_20240605_08.hpl", "User1_213_20240605_090012.hpl"]);
        assert_eq!(files[1].contents, b"now");

        let stats = connector.stats();
        assert_eq!(stats.downloads, 2);
        assert_eq!(stats.closes, 1);
    }

    #[test]
    fn test_previous_hour_across_midnight() {
        let connector = MemoryConnector::new();
        connector.insert_file("/C:/Lidar/Data/Proc/2024/202406/20240605/Stare_20240605_23.hpl", b"a");
        connector.insert_file("/C:/Lidar/Data/Proc/2024/202406/20240606/Stare_20240606_00.hpl", b"b");

        let files = fetch_recent_files(
            &connector,
            SessionSource::Connect(&creds()),
            at(2024, 6, 6, 0, 10),
            DATA_ROOT,
        )
        .unwrap();

        assert_eq!(files.len(), 2);
        assert_eq!(files[0].name, "Stare_20240606_00.hpl");
        assert_eq!(files[1].name, "Stare_20240605_23.hpl");
    }

    #[test]
    fn test_no_matching_files_is_empty() {
        let connector = MemoryConnector::new();
        connector.insert_file("/C:/Lidar/Data/Proc/2024/202406/20240605/Stare_20240605_01.hpl", b"");
        let mut session = connector.connect(&creds()).unwrap();

        let files = fetch_recent_files(
            &connector,
            SessionSource::Existing(&mut session),
            at(2024, 6, 5, 12, 0),
            DATA_ROOT,
        )
        .unwrap();

        assert!(files.is_empty());
        assert!(session.is_open());
    }

    #[test]
    fn test_missing_day_directory_fails() {
        let connector = MemoryConnector::new();
        let err = fetch_recent_files(
            &connector,
            SessionSource::Connect(&creds()),
            at(2024, 6, 5, 12, 0),
            DATA_ROOT,
        )
        .unwrap_err();
        assert!(matches!(err, TransportError::List { .. }));
        assert_eq!(connector.stats().closes, 1);
    }
}
