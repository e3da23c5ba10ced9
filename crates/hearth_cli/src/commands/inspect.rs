//! Lists the objects in a journal file.

use hearth_protocol::ObjectType;
use hearth_storage::FileBackend;
use std::error::Error;
use std::path::Path;

/// Prints the latest record of every key.
pub fn run(path: &Path, object_type: Option<&str>, format: &str) -> Result<(), Box<dyn Error>> {
    if !path.exists() {
        return Err(format!("no journal at {}", path.display()).into());
    }
    let filter = object_type.map(ObjectType::from_name).transpose()?;

    let backend = FileBackend::open(path)?;
    let objects: Vec<_> = backend
        .objects()
        .into_iter()
        .filter(|object| {
            filter
                .as_ref()
                .map_or(true, |wanted| object.key.object_type() == wanted)
        })
        .collect();

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&objects)?),
        "text" => {
            println!("{} ({} keys)", path.display(), backend.len());
            for object in &objects {
                println!(
                    "{:<40} rev {:>6}  ts {}  {}",
                    object.key.to_string(),
                    object.revision,
                    object.timestamp,
                    serde_json::to_string(&object.value)?
                );
            }
        }
        other => return Err(format!("unknown format {other:?}, expected text or json").into()),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_protocol::{ObjectKey, StoredObject};
    use hearth_storage::ObjectBackend;
    use tempfile::tempdir;

    #[tokio::test]
    async fn inspects_existing_journal() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("objects.jsonl");
        let backend = FileBackend::open(&path).unwrap();
        backend
            .persist(&StoredObject::new(
                ObjectKey::parse("device.A").unwrap(),
                Default::default(),
                1,
                1,
            ))
            .await
            .unwrap();

        assert!(run(&path, None, "text").is_ok());
        assert!(run(&path, Some("device"), "json").is_ok());
        assert!(run(&path, None, "yaml").is_err());
        assert!(run(&path, Some("Bad Type"), "text").is_err());
    }

    #[test]
    fn missing_journal_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(run(&dir.path().join("nope.jsonl"), None, "text").is_err());
    }
}
