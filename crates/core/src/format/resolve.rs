//! Target resolution across a batch of source formats.

use std::collections::HashSet;

use super::registry::FormatRegistry;
use super::types::FormatId;

/// Allowed targets of a single format. Unknown formats have none.
pub fn targets_of(registry: &FormatRegistry, format: FormatId) -> &[FormatId] {
    registry.get(format).map(|d| d.targets).unwrap_or(&[])
}

/// Targets every distinct input format can be converted to.
///
/// The result is ordered by registry registration order, so it does not
/// depend on the order or multiplicity of `formats`. Empty input yields an
/// empty result: with no sources there is no target known to be safe.
pub fn find_common_targets(registry: &FormatRegistry, formats: &[FormatId]) -> Vec<FormatId> {
    let distinct: HashSet<FormatId> = formats.iter().copied().collect();
    if distinct.is_empty() {
        return Vec::new();
    }

    registry
        .ids()
        .filter(|candidate| {
            distinct
                .iter()
                .all(|source| targets_of(registry, *source).contains(candidate))
        })
        .collect()
}

/// True if every source lists `target` as an allowed conversion.
pub fn can_convert_to_target(
    registry: &FormatRegistry,
    formats: &[FormatId],
    target: FormatId,
) -> bool {
    !formats.is_empty() && incompatible_formats(registry, formats, target).is_empty()
}

/// Distinct sources that cannot be converted to `target`, in input order.
pub fn incompatible_formats(
    registry: &FormatRegistry,
    formats: &[FormatId],
    target: FormatId,
) -> Vec<FormatId> {
    let mut seen = HashSet::new();
    formats
        .iter()
        .copied()
        .filter(|f| seen.insert(*f))
        .filter(|f| !targets_of(registry, *f).contains(&target))
        .collect()
}

/// User-facing summary of what a batch can be converted to.
pub fn compatibility_message(registry: &FormatRegistry, formats: &[FormatId]) -> String {
    let mut seen = HashSet::new();
    let distinct: Vec<FormatId> = formats.iter().copied().filter(|f| seen.insert(*f)).collect();
    if distinct.is_empty() {
        return "No files to convert".to_string();
    }

    let common = find_common_targets(registry, &distinct);
    if common.is_empty() {
        return format!(
            "No common target format for {} files",
            join_labels(registry, &distinct, " and ")
        );
    }

    format!(
        "{} files can be converted to {}",
        join_labels(registry, &distinct, ", "),
        join_labels(registry, &common, ", ")
    )
}

/// Explains why `target` cannot be selected for a batch, if it cannot.
pub fn incompatibility_message(
    registry: &FormatRegistry,
    formats: &[FormatId],
    target: FormatId,
) -> Option<String> {
    let incompatible = incompatible_formats(registry, formats, target);
    if incompatible.is_empty() {
        return None;
    }
    Some(format!(
        "{} files cannot be converted to {}",
        join_labels(registry, &incompatible, ", "),
        label(registry, target)
    ))
}

fn label(registry: &FormatRegistry, id: FormatId) -> &'static str {
    registry.get(id).map(|d| d.label).unwrap_or(id.as_str())
}

fn join_labels(registry: &FormatRegistry, ids: &[FormatId], sep: &str) -> String {
    ids.iter()
        .map(|id| label(registry, *id))
        .collect::<Vec<_>>()
        .join(sep)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::ids::*;

    fn reg() -> &'static FormatRegistry {
        FormatRegistry::standard()
    }

    #[test]
    fn test_empty_input_has_no_common_targets() {
        assert!(find_common_targets(reg(), &[]).is_empty());
    }

    #[test]
    fn test_single_format_common_targets_equal_its_targets() {
        for id in reg().ids() {
            let mut expected = targets_of(reg(), id).to_vec();
            expected.sort_by_key(|t| reg().position(*t));
            assert_eq!(find_common_targets(reg(), &[id]), expected, "{}", id);
        }
    }

    #[test]
    fn test_common_targets_order_and_duplicate_independent() {
        let a = find_common_targets(reg(), &[PNG, JPEG, BMP]);
        let b = find_common_targets(reg(), &[BMP, PNG, JPEG, PNG, BMP]);
        assert_eq!(a, b);
        assert_eq!(a, vec![GIF, WEBP, TIFF, ICO]);
    }

    #[test]
    fn test_png_and_ico_have_no_common_target() {
        let formats = [PNG, ICO];
        assert!(find_common_targets(reg(), &formats).is_empty());
        assert_eq!(
            compatibility_message(reg(), &formats),
            "No common target format for PNG and ICO files"
        );
    }

    #[test]
    fn test_mixed_families_have_no_common_target() {
        assert!(find_common_targets(reg(), &[PNG, MP3]).is_empty());
    }

    #[test]
    fn test_can_convert_and_incompatible() {
        assert!(can_convert_to_target(reg(), &[PNG, JPEG], WEBP));
        assert!(!can_convert_to_target(reg(), &[PNG, JPEG], PNG));
        assert!(!can_convert_to_target(reg(), &[], PNG));
        assert_eq!(incompatible_formats(reg(), &[PNG, ICO, ICO], JPEG), vec![ICO]);
        assert_eq!(
            incompatibility_message(reg(), &[PNG, ICO], JPEG).unwrap(),
            "ICO files cannot be converted to JPEG"
        );
        assert!(incompatibility_message(reg(), &[WAV], MP3).is_none());
    }

    #[test]
    fn test_compatibility_message_lists_targets() {
        let msg = compatibility_message(reg(), &[WAV, FLAC]);
        assert_eq!(
            msg,
            "WAV, FLAC files can be converted to Opus, Ogg Vorbis, MP3, AAC (ADTS), M4A, WebM audio"
        );
        assert_eq!(compatibility_message(reg(), &[]), "No files to convert");
    }

    #[test]
    fn test_unknown_format_has_no_targets() {
        assert!(targets_of(reg(), FormatId::new("nope")).is_empty());
    }
}
