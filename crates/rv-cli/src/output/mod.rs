//! Output formatting utilities for the CLI
//!
//! Tables for tunnel listings and colored one-line status messages.

use tabled::{settings::Style, Table, Tabled};

use rv_core::control::ConnectionInfo;

/// Format live tunnels as a table
///
/// Returns "No active connections" when the list is empty.
pub fn format_connections(connections: &[ConnectionInfo]) -> String {
    if connections.is_empty() {
        return "No active connections".to_string();
    }

    #[derive(Tabled)]
    struct ConnectionRow {
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "IP")]
        ip: String,
        #[tabled(rename = "LISTEN ADDRESS")]
        listen_addr: String,
    }

    let rows: Vec<ConnectionRow> = connections
        .iter()
        .map(|c| ConnectionRow {
            id: c.id.clone(),
            ip: c.ip.clone(),
            listen_addr: c.listen_addr.clone(),
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

/// Print a success message in green with a checkmark prefix
pub fn print_success(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Green),
        Print("✓ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an error message in red to stderr
pub fn print_error(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Red),
        Print("✗ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print a warning message in yellow to stderr
pub fn print_warning(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Yellow),
        Print("⚠ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

pub fn print_info(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Cyan),
        Print("ℹ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(id: &str, ip: &str, listen_addr: &str) -> ConnectionInfo {
        ConnectionInfo {
            id: id.to_string(),
            ip: ip.to_string(),
            listen_addr: listen_addr.to_string(),
        }
    }

    #[test]
    fn test_empty_listing() {
        assert_eq!(format_connections(&[]), "No active connections");
    }

    #[test]
    fn test_table_has_headers_and_rows() {
        let table = format_connections(&[
            info("0a1b2c3d", "10.0.0.5", "127.0.0.1:40001"),
            info("ffee0011", "10.0.0.9", "127.0.0.1:40002"),
        ]);

        for expected in [
            "ID",
            "IP",
            "LISTEN ADDRESS",
            "0a1b2c3d",
            "10.0.0.9",
            "127.0.0.1:40002",
        ] {
            assert!(table.contains(expected), "missing {expected} in\n{table}");
        }
        assert!(table.find("0a1b2c3d").unwrap() < table.find("ffee0011").unwrap());
    }
}
