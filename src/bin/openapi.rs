use anyhow::Result;

// Print the OpenAPI document as JSON
fn main() -> Result<()> {
    let doc = interntrack::api::openapi();
    let json = serde_json::to_string_pretty(&doc)?;
    println!("{json}");
    Ok(())
}
