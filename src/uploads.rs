//! Upload checks. Only the filename of an upload is recorded; the bytes are
//! drained from the request and dropped.

use mime_guess::mime;

/// Accepted assignment types: pdf, docx, png, jpg/jpeg.
pub fn is_accepted_upload(filename: &str) -> bool {
    let guess = mime_guess::from_path(filename);
    guess.iter().any(|m| {
        m == mime::APPLICATION_PDF
            || m == mime::IMAGE_PNG
            || m == mime::IMAGE_JPEG
            || m.essence_str() == "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
    })
}

/// Strips any client-side directory prefix from an uploaded filename.
pub fn clean_filename(raw: &str) -> String {
    raw.rsplit(['/', '\\'])
        .next()
        .unwrap_or(raw)
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assignment_types_are_accepted() {
        for name in ["essay.pdf", "Report.DOCX", "diagram.png", "photo.jpg", "photo.jpeg"] {
            assert!(is_accepted_upload(name), "{name} should be accepted");
        }
    }

    #[test]
    fn other_types_are_rejected() {
        for name in ["script.exe", "notes.txt", "archive.zip", "noextension", "old.doc"] {
            assert!(!is_accepted_upload(name), "{name} should be rejected");
        }
    }

    #[test]
    fn directory_prefixes_are_removed() {
        assert_eq!(clean_filename("C:\\Users\\me\\essay.pdf"), "essay.pdf");
        assert_eq!(clean_filename("/tmp/week 2/report.docx"), "report.docx");
        assert_eq!(clean_filename("plain.png"), "plain.png");
    }
}
