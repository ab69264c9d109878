use sea_orm_migration::prelude::*;
use std::env;

use migration::Migrator;

enum Command {
    Up(Option<u32>),
    Down(Option<u32>),
    Fresh,
    Status,
}

fn parse_command(args: &[String]) -> Result<Command, String> {
    let steps = match args.get(2) {
        Some(raw) => Some(
            raw.parse::<u32>()
                .map_err(|_| format!("Invalid step count: {}", raw))?,
        ),
        None => None,
    };

    match args.get(1).map(|s| s.as_str()).unwrap_or("up") {
        "up" => Ok(Command::Up(steps)),
        "down" => Ok(Command::Down(steps.or(Some(1)))),
        "fresh" => Ok(Command::Fresh),
        "status" => Ok(Command::Status),
        other => Err(format!(
            "Unknown command: {}. Use: up [n], down [n], fresh, or status",
            other
        )),
    }
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    let args: Vec<String> = env::args().collect();
    let command = match parse_command(&args) {
        Ok(command) => command,
        Err(message) => {
            eprintln!("{}", message);
            std::process::exit(1);
        }
    };

    let db_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let db = sea_orm::Database::connect(&db_url)
        .await
        .expect("Failed to connect to database");

    let result = match command {
        Command::Up(steps) => Migrator::up(&db, steps).await.map(|_| "applied"),
        Command::Down(steps) => Migrator::down(&db, steps).await.map(|_| "rolled back"),
        Command::Fresh => Migrator::fresh(&db).await.map(|_| "recreated"),
        Command::Status => Migrator::status(&db).await.map(|_| "listed"),
    };

    match result {
        Ok(outcome) => println!("Migrations {}", outcome),
        Err(e) => {
            eprintln!("Migration failed: {}", e);
            std::process::exit(1);
        }
    }
}
