use sea_orm_migration::prelude::*;

#[tokio::main]
async fn main() {
    cli::run_cli(blackout_switch_migration::Migrator).await;
}
