use anyhow::Result;

fn main() -> Result<()> {
    csvw_rdf_cli::run()
}
