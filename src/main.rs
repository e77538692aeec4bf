#[tokio::main]
async fn main() {
    if let Err(e) = reminder_buddy::run().await {
        eprintln!("reminder-buddy: {e}");
        std::process::exit(1);
    }
}
