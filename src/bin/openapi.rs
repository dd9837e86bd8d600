use anyhow::Result;

/// Print the generated OpenAPI document as JSON for CI artifacts and clients.
fn main() -> Result<()> {
    let spec = gardi::api::openapi();
    println!("{}", serde_json::to_string_pretty(&spec)?);
    Ok(())
}
