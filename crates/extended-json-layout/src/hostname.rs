// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Hostname detection utilities

use crate::error::LayoutError;

/// Look up the local host name.
///
/// Uses `gethostname(2)` on unix and `COMPUTERNAME` elsewhere. Empty and
/// non-UTF-8 names are reported as errors rather than replaced with a
/// placeholder, so callers can decide whether to emit the field at all.
pub fn lookup_hostname() -> Result<String, LayoutError> {
    let hostname = system_hostname()?;
    if hostname.trim().is_empty() {
        return Err(LayoutError::Hostname("system returned an empty hostname".to_string()));
    }
    Ok(hostname)
}

#[cfg(unix)]
fn system_hostname() -> Result<String, LayoutError> {
    let raw = nix::unistd::gethostname().map_err(|e| LayoutError::Hostname(e.to_string()))?;
    raw.into_string()
        .map_err(|raw| LayoutError::Hostname(format!("hostname is not valid UTF-8: {raw:?}")))
}

#[cfg(not(unix))]
fn system_hostname() -> Result<String, LayoutError> {
    std::env::var("COMPUTERNAME").map_err(|e| LayoutError::Hostname(e.to_string()))
}
