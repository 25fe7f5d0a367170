use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelResolveError {
    #[error("no cache directory for speech models on this platform")]
    NoCacheDir,
    #[error("model download from {url} failed: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("model download from {url} was empty")]
    Empty { url: String },
    #[error("cannot store model at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Called with `(bytes_so_far, content_length)`; the length is 0 when the
/// server does not send one.
pub type ProgressFn = Box<dyn Fn(u64, u64) + Send>;

/// Returns the cached model `name`, downloading it from `url` on first use.
pub fn resolve(
    name: &str,
    url: &str,
    progress: Option<ProgressFn>,
) -> Result<PathBuf, ModelResolveError> {
    let cache_dir = dirs::cache_dir()
        .map(|d| d.join("longscribe").join("models"))
        .ok_or(ModelResolveError::NoCacheDir)?;
    resolve_in(&cache_dir, name, url, progress)
}

/// [`resolve`] against an explicit cache directory.
pub fn resolve_in(
    cache_dir: &Path,
    name: &str,
    url: &str,
    progress: Option<ProgressFn>,
) -> Result<PathBuf, ModelResolveError> {
    let model_path = cache_dir.join(name);
    if model_path.is_file() {
        log::debug!("Using cached model {}", model_path.display());
        return Ok(model_path);
    }

    fs::create_dir_all(cache_dir).map_err(|source| ModelResolveError::Io {
        path: cache_dir.to_path_buf(),
        source,
    })?;
    log::info!("Fetching model {name} from {url}");

    let partial = model_path.with_extension("part");
    let fetched = fetch(url, &partial, progress);
    if fetched.is_err() {
        let _ = fs::remove_file(&partial);
    }
    fetched?;

    fs::rename(&partial, &model_path).map_err(|source| ModelResolveError::Io {
        path: model_path.clone(),
        source,
    })?;
    Ok(model_path)
}

fn fetch(url: &str, dest: &Path, progress: Option<ProgressFn>) -> Result<(), ModelResolveError> {
    let download_error = |source| ModelResolveError::Download {
        url: url.to_string(),
        source,
    };
    let io_error = |source| ModelResolveError::Io {
        path: dest.to_path_buf(),
        source,
    };

    let mut response = reqwest::blocking::get(url)
        .and_then(|r| r.error_for_status())
        .map_err(download_error)?;
    let total = response.content_length().unwrap_or(0);

    let mut out = io::BufWriter::new(fs::File::create(dest).map_err(io_error)?);
    let mut buf = vec![0u8; 256 * 1024];
    let mut written = 0u64;
    loop {
        let n = response.read(&mut buf).map_err(io_error)?;
        if n == 0 {
            break;
        }
        out.write_all(&buf[..n]).map_err(io_error)?;
        written += n as u64;
        if let Some(report) = &progress {
            report(written, total);
        }
    }
    out.flush().map_err(io_error)?;

    if written == 0 {
        return Err(ModelResolveError::Empty {
            url: url.to_string(),
        });
    }
    Ok(())
}
