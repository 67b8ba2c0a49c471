/// Number of decimal digits in a snapshot file name.
pub const INDEX_WIDTH: usize = 8;

/// Largest index the fixed-width scheme can express.
pub const MAX_INDEX: u64 = 99_999_999;

const EXTENSION: &str = ".jpg";

/// File name for a sequence number, e.g. `00000001.jpg`.
pub fn snapshot_file_name(index: u64) -> String {
    format!("{index:0width$}{EXTENSION}", width = INDEX_WIDTH)
}

/// Sequence number encoded in a snapshot file name.
///
/// Only exactly eight ASCII digits followed by a lowercase `.jpg` match;
/// anything else (`foo.jpg`, `12.jpg`, `00000001.png`) yields `None`.
pub fn parse_snapshot_index(name: &str) -> Option<u64> {
    let stem = name.strip_suffix(EXTENSION)?;
    if stem.len() != INDEX_WIDTH || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stem.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_padded_names() {
        assert_eq!(snapshot_file_name(1), "00000001.jpg");
        assert_eq!(snapshot_file_name(42), "00000042.jpg");
        assert_eq!(snapshot_file_name(MAX_INDEX), "99999999.jpg");
    }

    #[test]
    fn parses_valid_names() {
        assert_eq!(parse_snapshot_index("00000001.jpg"), Some(1));
        assert_eq!(parse_snapshot_index("00012345.jpg"), Some(12345));
        assert_eq!(parse_snapshot_index("00000000.jpg"), Some(0));
    }

    #[test]
    fn rejects_everything_else() {
        for name in [
            "foo.jpg",
            "12.png",
            "12.jpg",
            "00000001.png",
            "00000001.JPG",
            "000000001.jpg",
            "0000001a.jpg",
            "+0000001.jpg",
            ".00000001.jpg.part",
            "00000001.jpg.bak",
            "",
        ] {
            assert_eq!(parse_snapshot_index(name), None, "{name:?} should not match");
        }
    }

    #[test]
    fn names_sort_in_index_order() {
        let mut names: Vec<String> = [10, 2, 100, 1].into_iter().map(snapshot_file_name).collect();
        names.sort();
        assert_eq!(
            names,
            vec!["00000001.jpg", "00000002.jpg", "00000010.jpg", "00000100.jpg"]
        );
    }
}
