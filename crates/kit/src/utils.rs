use camino::{Utf8Path, Utf8PathBuf};
use color_eyre::eyre::{eyre, Context};
use color_eyre::Result;
use tracing::debug;

use crate::pve;

/// Parse a memory string (like "2G", "1024M", "512") to megabytes.
///
/// qm takes memory in plain megabytes; suffixed values are binary units
/// (G = GiB, M = MiB, K = KiB), a bare number is already megabytes.
pub(crate) fn parse_memory_to_mb(memory_str: &str) -> Result<u32> {
    let memory_str = memory_str.trim();

    if memory_str.is_empty() {
        return Err(eyre!("Memory string cannot be empty"));
    }

    // Strip the unit suffix, checking case-insensitively
    let (number_str, mib_per_unit) = if let Some(num) = memory_str
        .strip_suffix('G')
        .or_else(|| memory_str.strip_suffix('g'))
    {
        (num, 1024.0)
    } else if let Some(num) = memory_str
        .strip_suffix('M')
        .or_else(|| memory_str.strip_suffix('m'))
    {
        (num, 1.0)
    } else if let Some(num) = memory_str
        .strip_suffix('K')
        .or_else(|| memory_str.strip_suffix('k'))
    {
        (num, 1.0 / 1024.0)
    } else {
        // No suffix, assume megabytes
        (memory_str, 1.0)
    };

    let number: f64 = number_str
        .parse()
        .context("Invalid number in memory specification")?;

    Ok((number * mib_per_unit) as u32)
}

/// Resolve the cloud image path the way `qm` expects it: an absolute path.
///
/// Relative paths are resolved against the current directory; if the file
/// is not there, the node ISO directory is tried as a fallback.
pub(crate) fn resolve_iso_path(iso: &Utf8Path) -> Result<Utf8PathBuf> {
    let absolute = if iso.is_absolute() {
        iso.to_owned()
    } else {
        let cwd = std::env::current_dir().context("Failed to read current directory")?;
        let cwd = Utf8PathBuf::try_from(cwd).context("Current directory is not valid UTF-8")?;
        cwd.join(iso)
    };

    if absolute.exists() {
        return Ok(absolute);
    }

    let file_name = absolute
        .file_name()
        .ok_or_else(|| eyre!("ISO path has no file name: {}", iso))?;
    let in_iso_dir = Utf8Path::new(pve::ISO_DIR).join(file_name);
    if in_iso_dir.exists() {
        debug!("ISO not found at {}, using {}", absolute, in_iso_dir);
        return Ok(in_iso_dir);
    }

    Err(eyre!(
        "The ISO file must be located in the current directory or '{}'",
        pve::ISO_DIR
    ))
}

/// Check that a cloud-init snippet is in place before any qm command runs.
///
/// The snippet is referenced by name through the `local` storage
/// (`local:snippets/<name>`); pvekit does not copy it there.
pub(crate) fn validate_snippet(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(eyre!("Cloud-init snippet name cannot be empty"));
    }
    if name.contains('/') {
        return Err(eyre!(
            "Cloud-init snippet must be a plain file name under '{}', not a path: {}",
            pve::SNIPPETS_DIR,
            name
        ));
    }

    let path = Utf8Path::new(pve::SNIPPETS_DIR).join(name);
    if !path.exists() {
        return Err(eyre!(
            "The cloud-init snippet '{}' does not exist in '{}'",
            name,
            pve::SNIPPETS_DIR
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_memory_to_mb() -> Result<()> {
        assert_eq!(parse_memory_to_mb("2G")?, 2048);
        assert_eq!(parse_memory_to_mb("1024M")?, 1024);
        assert_eq!(parse_memory_to_mb("512")?, 512);
        assert_eq!(parse_memory_to_mb("2046")?, 2046);
        assert_eq!(parse_memory_to_mb("1.5g")?, 1536);
        assert_eq!(parse_memory_to_mb("1024k")?, 1);
        Ok(())
    }

    #[test]
    fn test_parse_memory_rejects_garbage() {
        assert!(parse_memory_to_mb("").is_err());
        assert!(parse_memory_to_mb("lots").is_err());
    }

    #[test]
    fn test_resolve_iso_path_absolute() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let iso = dir.path().join("debian-12-genericcloud-amd64.img");
        std::fs::write(&iso, b"not really an image")?;

        let iso = Utf8PathBuf::try_from(iso).unwrap();
        let resolved = resolve_iso_path(&iso)?;
        assert_eq!(resolved, iso);
        Ok(())
    }

    #[test]
    fn test_resolve_iso_path_missing() {
        let err = resolve_iso_path(Utf8Path::new("/nonexistent/no-such.img")).unwrap_err();
        assert!(err.to_string().contains(pve::ISO_DIR));
    }

    #[test]
    fn test_validate_snippet_rejects_paths() {
        assert!(validate_snippet("").is_err());
        assert!(validate_snippet("../user.yaml").is_err());
        assert!(validate_snippet("/etc/passwd").is_err());
    }

    #[test]
    fn test_validate_snippet_missing_file() {
        let err = validate_snippet("pvekit-test-no-such-snippet.yaml").unwrap_err();
        assert!(err.to_string().contains(pve::SNIPPETS_DIR));
    }
}
