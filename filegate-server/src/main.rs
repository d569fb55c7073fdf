use anyhow::Result;

fn main() -> Result<()> {
    filegate_server::cli::execute()
}
