extern crate rusqlite;

use chrono::Local;
use log::info;
use rusqlite::{params, Connection, NO_PARAMS};

use crate::error::Result;
use crate::mime::header::HeaderSummary;

/// A retrieved message, as remembered in the summary log.
pub struct EmailEntity<'a> {
    pub msg_number: u32,
    pub summary: &'a HeaderSummary,
}

fn open(db_name: &str) -> Result<Connection> {
    let conn = Connection::open(db_name)?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS emails (
            id INTEGER PRIMARY KEY,
            msg_number INTEGER NOT NULL,
            sender_name TEXT NOT NULL,
            sender_address TEXT NOT NULL,
            subject TEXT NOT NULL,
            date_received TEXT,
            retrieved_at TEXT NOT NULL
        )",
        NO_PARAMS,
    )?;
    Ok(conn)
}

/// Appends one row per entity to the `emails` table of `db_name`, creating
/// the file and table on first use. All rows go in one transaction.
pub fn persist_emails(emails: &[EmailEntity], db_name: &str) -> Result<()> {
    let mut conn = open(db_name)?;
    let retrieved_at = Local::now().to_rfc3339();

    let tx = conn.transaction()?;
    for email in emails {
        tx.execute(
            "INSERT INTO emails (msg_number, sender_name, sender_address, subject, date_received, retrieved_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                email.msg_number,
                email.summary.sender.name,
                email.summary.sender.address,
                email.summary.subject,
                email.summary.date,
                retrieved_at,
            ],
        )?;
    }
    tx.commit()?;
    info!("Persisted {} email summaries in {}", emails.len(), db_name);
    Ok(())
}
