//! Prints the OpenAPI document as JSON.

use utoipa::OpenApi;
use word_duel_back::services::documentation::ApiDoc;

fn main() -> Result<(), serde_json::Error> {
    let doc = ApiDoc::openapi();
    println!("{}", doc.to_pretty_json()?);
    Ok(())
}
