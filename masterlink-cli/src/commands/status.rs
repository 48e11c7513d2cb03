//! `status` command implementation.

use anyhow::{Context, Result};
use masterlink::{Fields, MasterCommunicator, api};

/// Master clock and mode as read from an `ST` reply.
#[derive(Debug, PartialEq, Eq, serde::Serialize)]
struct MasterStatus {
    hours: u32,
    minutes: u32,
    year: u32,
    month: u32,
    day: u32,
    weekday: u32,
    mode: u32,
}

impl MasterStatus {
    fn from_fields(fields: &Fields) -> Result<Self> {
        let get = |name: &str| {
            fields
                .get_int(name)
                .with_context(|| format!("status reply lacks '{name}'"))
        };
        Ok(Self {
            hours: get("hours")?,
            minutes: get("minutes")?,
            year: get("year")?,
            month: get("month")?,
            day: get("day")?,
            weekday: get("weekday")?,
            mode: get("mode")?,
        })
    }

    fn summary(&self) -> String {
        format!(
            "Master clock {:02}:{:02}, 20{:02}-{:02}-{:02} (weekday {}), mode {}",
            self.hours, self.minutes, self.year, self.month, self.day, self.weekday, self.mode
        )
    }
}

/// Query and print the master status.
pub(crate) fn cmd_status(communicator: &MasterCommunicator, json: bool) -> Result<()> {
    let reply = communicator
        .do_command(api::status(), &Fields::new())
        .context("Status request failed")?;
    let status = MasterStatus::from_fields(&reply)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("{}", status.summary());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_from_reply_fields() {
        let fields = Fields::new()
            .with("hours", 7u8)
            .with("minutes", 5u8)
            .with("year", 24u8)
            .with("month", 3u8)
            .with("day", 9u8)
            .with("weekday", 6u8)
            .with("mode", 1u8);
        let status = MasterStatus::from_fields(&fields).unwrap();
        assert_eq!(
            status.summary(),
            "Master clock 07:05, 2024-03-09 (weekday 6), mode 1"
        );
    }

    #[test]
    fn test_status_missing_field() {
        let err = MasterStatus::from_fields(&Fields::new()).unwrap_err();
        assert!(err.to_string().contains("hours"));
    }
}
