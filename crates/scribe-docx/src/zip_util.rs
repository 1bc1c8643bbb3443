//! ZIP container helpers with inflation guardrails.

use std::io::Read;

use zip::read::ZipFile;

use crate::DocxError;

/// Compare two part names tolerating common producer mistakes: a leading
/// `/`, Windows-style `\` separators, and ASCII case differences.
pub(crate) fn part_names_equivalent(a: &str, b: &str) -> bool {
    fn normalized(s: &str) -> impl Iterator<Item = u8> + '_ {
        s.as_bytes()
            .iter()
            .copied()
            .skip_while(|b| matches!(b, b'/' | b'\\'))
            .map(|b| if b == b'\\' { b'/' } else { b.to_ascii_lowercase() })
    }

    normalized(a).eq(normalized(b))
}

/// Running total of uncompressed bytes inflated from one archive, enforced
/// against a package-wide ceiling.
#[derive(Debug, Clone)]
pub(crate) struct ZipInflateBudget {
    max_total_bytes: u64,
    used_bytes: u64,
}

impl ZipInflateBudget {
    pub(crate) fn new(max_total_bytes: u64) -> Self {
        Self {
            max_total_bytes,
            used_bytes: 0,
        }
    }

    fn consume(&mut self, bytes: u64) -> Result<(), DocxError> {
        self.used_bytes = self.used_bytes.checked_add(bytes).unwrap_or(u64::MAX);
        if self.used_bytes > self.max_total_bytes {
            return Err(DocxError::PackageTooLarge {
                total: self.used_bytes,
                max: self.max_total_bytes,
            });
        }
        Ok(())
    }
}

/// Read a ZIP entry into memory, enforcing a per-part size limit and the
/// shared inflate budget.
///
/// ZIP metadata is not trusted on its own: the declared uncompressed size is
/// only a fast-path rejection, and the actual read is capped at one byte past
/// the limit so forged size fields still fail deterministically.
pub(crate) fn read_zip_file_bytes(
    file: &mut ZipFile<'_>,
    part: &str,
    max_part_bytes: u64,
    budget: &mut ZipInflateBudget,
) -> Result<Vec<u8>, DocxError> {
    let declared = file.size();
    if declared > max_part_bytes {
        return Err(DocxError::PartTooLarge {
            part: part.to_string(),
            size: declared,
            max: max_part_bytes,
        });
    }

    let mut buf = Vec::new();
    let read_limit = max_part_bytes.checked_add(1).unwrap_or(u64::MAX);
    file.take(read_limit).read_to_end(&mut buf)?;

    let observed = buf.len() as u64;
    if observed > max_part_bytes {
        return Err(DocxError::PartTooLarge {
            part: part.to_string(),
            size: observed,
            max: max_part_bytes,
        });
    }

    budget.consume(observed)?;
    Ok(buf)
}
