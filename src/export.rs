use crate::client::CsvExport;
use crate::roster::day_key;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::NaiveDate;
use tracing::info;

pub fn export_file_name(date: NaiveDate) -> String {
    format!("attendance_{}.csv", day_key(date))
}

/// Where a download is saved: the server's own name for it when it sent one,
/// so the name and the contents agree on which day it is.
pub fn local_file_name(export: &CsvExport, fallback_date: NaiveDate) -> String {
    export
        .file_name
        .clone()
        .unwrap_or_else(|| export_file_name(fallback_date))
}

/// Writes a downloaded CSV into `dir`, creating it if needed.
pub async fn save_csv(dir: &Utf8Path, file_name: &str, csv: &str) -> Result<Utf8PathBuf> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Creating export directory {}", dir))?;

    let path = dir.join(file_name);
    tokio::fs::write(&path, csv)
        .await
        .with_context(|| format!("Writing {}", path))?;

    info!("Saved {} bytes of CSV to {}", csv.len(), path);
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(prefix: &str) -> Utf8PathBuf {
        let p = std::env::temp_dir().join(format!(
            "{}-{}",
            prefix,
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ));
        Utf8PathBuf::from_path_buf(p).expect("utf-8 temp dir")
    }

    #[test]
    fn file_name_carries_the_day() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(export_file_name(date), "attendance_2024-03-09.csv");
    }

    #[test]
    fn server_name_wins_over_local_date() {
        let local = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        let export = CsvExport {
            csv: String::new(),
            file_name: Some("attendance_2024-03-09.csv".to_string()),
        };
        assert_eq!(local_file_name(&export, local), "attendance_2024-03-09.csv");

        let unnamed = CsvExport {
            file_name: None,
            ..export
        };
        assert_eq!(local_file_name(&unnamed, local), "attendance_2024-03-10.csv");
    }

    #[tokio::test]
    async fn csv_is_written_into_new_directory() {
        let dir = temp_dir("qr-attendance-export").join("nested");
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        let csv = "id,regno,name\n1,A12,John Doe\n";

        let path = save_csv(&dir, &export_file_name(date), csv).await.unwrap();
        assert_eq!(path.file_name(), Some("attendance_2024-03-09.csv"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), csv);

        std::fs::remove_dir_all(dir.parent().unwrap()).ok();
    }
}
