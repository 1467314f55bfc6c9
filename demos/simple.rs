//! Minimal example: five CRUD routes for one model, no authentication
//!
//! ```bash
//! cargo run --example simple
//! curl -X POST localhost:3000/api/widgets -d '{"name":"sprocket"}'
//! curl localhost:3000/api/widgets
//! ```

use anyhow::Result;
use grapi::prelude::*;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Widget {
    #[serde(default)]
    id: u64,
    name: String,
}

impl Model for Widget {
    fn model_name() -> &'static str {
        "Widget"
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    grapi::logging::init(LogLevel::Verbose);

    let store = MemoryStore::new();
    store.seed(
        "widgets",
        vec![
            json!({"id": 1, "name": "sprocket"}),
            json!({"id": 2, "name": "cog"}),
        ],
    )?;

    let options = Options::builder()
        .store(store)
        .log_level(LogLevel::Verbose)
        .build()?;
    let api = Api::new(options).add_default_routes::<Widget>(vec![])?;

    println!("🚀 grapi simple example");
    for (method, path) in api.routes() {
        println!("   {:<6} {}", method, path);
    }
    println!();

    api.serve("127.0.0.1:3000").await
}
