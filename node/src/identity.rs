//! Node identity keypair files.

use {
    crate::error::{NodeError, Result},
    log::{info, warn},
    solana_keypair::{read_keypair_file, write_keypair_file, Keypair},
    solana_signer::Signer,
    std::path::Path,
};

/// Read the keypair at `path`, or generate a throwaway one when no path is
/// configured.
pub fn load_identity(path: Option<&Path>) -> Result<Keypair> {
    match path {
        Some(path) => {
            let keypair = read_keypair_file(path).map_err(|e| {
                NodeError::Identity(format!("failed to read {}: {}", path.display(), e))
            })?;
            info!("identity {} loaded from {}", keypair.pubkey(), path.display());
            Ok(keypair)
        }
        None => {
            let keypair = Keypair::new();
            warn!(
                "no identity file configured, using ephemeral identity {}",
                keypair.pubkey()
            );
            Ok(keypair)
        }
    }
}

/// Generate a keypair and store it at `path`. Refuses to replace an existing
/// file unless `force` is set.
pub fn create_identity(path: &Path, force: bool) -> Result<Keypair> {
    if path.exists() && !force {
        return Err(NodeError::Identity(format!(
            "{} already exists, pass --force to overwrite",
            path.display()
        )));
    }
    let keypair = Keypair::new();
    write_keypair_file(&keypair, path).map_err(|e| {
        NodeError::Identity(format!("failed to write {}: {}", path.display(), e))
    })?;
    Ok(keypair)
}

#[cfg(test)]
mod tests {
    use {super::*, assert_matches::assert_matches};

    #[test]
    fn test_create_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("id.json");

        let created = create_identity(&path, false).unwrap();
        let loaded = load_identity(Some(&path)).unwrap();
        assert_eq!(created.pubkey(), loaded.pubkey());

        assert_matches!(create_identity(&path, false), Err(NodeError::Identity(_)));
        let replaced = create_identity(&path, true).unwrap();
        assert_ne!(replaced.pubkey(), created.pubkey());
    }

    #[test]
    fn test_missing_or_garbled_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("id.json");
        assert_matches!(load_identity(Some(&path)), Err(NodeError::Identity(_)));

        std::fs::write(&path, "not a keypair").unwrap();
        assert_matches!(load_identity(Some(&path)), Err(NodeError::Identity(_)));
    }

    #[test]
    fn test_ephemeral_identity() {
        let a = load_identity(None).unwrap();
        let b = load_identity(None).unwrap();
        assert_ne!(a.pubkey(), b.pubkey());
    }
}
