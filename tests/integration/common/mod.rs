use std::path::Path;
use std::sync::Arc;

use witflo::crypto::kdf::Argon2Params;
use witflo::crypto::secret::SecretBytes;
use witflo::workspace::UnlockedWorkspace;

pub const PASSPHRASE: &[u8] = b"correct horse battery staple";

pub fn passphrase(bytes: &[u8]) -> SecretBytes {
    SecretBytes::from_slice(bytes)
}

/// Initializes a workspace with test-speed Argon2 parameters.
pub async fn fresh_workspace(root: &Path) -> Arc<UnlockedWorkspace> {
    UnlockedWorkspace::initialize_with_params(
        root,
        passphrase(PASSPHRASE),
        Argon2Params::insecure_fast(),
    )
    .await
    .expect("workspace init")
}

/// Recursively collects every file under `dir`.
pub fn files_under(dir: &Path) -> Vec<std::path::PathBuf> {
    let mut files = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&current) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                files.push(path);
            }
        }
    }
    files
}

/// True if any file under `dir` contains `needle` as a byte substring.
pub fn any_file_contains(dir: &Path, needle: &[u8]) -> bool {
    files_under(dir).iter().any(|path| {
        std::fs::read(path)
            .map(|bytes| bytes.windows(needle.len()).any(|w| w == needle))
            .unwrap_or(false)
    })
}
