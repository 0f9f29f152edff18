use recluster_progress::orchestrate::worker_splits;

use crate::OutputFormat;

pub(crate) fn cmd_splits(workers: usize, output: OutputFormat) {
    let splits = worker_splits(workers);
    match output {
        OutputFormat::Json => {
            println!("{}", serde_json::json!({ "splits": splits }));
        }
        OutputFormat::Text => {
            for (i, bounds) in splits.windows(2).enumerate() {
                let start = if bounds[0].is_empty() {
                    "(start)"
                } else {
                    bounds[0].as_str()
                };
                println!("worker {}: {} .. {}", i + 1, start, bounds[1]);
            }
        }
    }
}
