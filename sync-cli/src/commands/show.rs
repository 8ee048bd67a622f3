//! Show the local preferences.

use anyhow::Result;

use super::{print_record, Session};

/// Run the show command. Never touches the network.
pub async fn run(session: &Session, json: bool) -> Result<()> {
    let record = session.store().read();

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
        return Ok(());
    }

    println!("Preferences:");
    print_record(&record);
    if record.is_unwritten() {
        println!();
        println!("(defaults; nothing stored yet)");
    }
    Ok(())
}
