//! # Artifact Filenames
//!
//! Every generated PDF gets an opaque name `<prefix>-XXXXXX-XXXXXX.pdf`:
//!
//! ```text
//! p-4fQ9aZ-Lm02Xc.pdf   main prescription
//! ep-4fQ9aZ-Lm02Xc.pdf  extra copy of that prescription ("e" + main name)
//! e-Tr7bB1-0qPzWw.pdf   e-ticket label
//! ```
//!
//! Uniqueness is checked against the database by the caller; this module
//! only produces candidates.

use rand::distributions::Alphanumeric;
use rand::Rng;

/// Length of each random segment.
pub const SEGMENT_LEN: usize = 6;

/// Kind of generated PDF, which decides prefix and owning table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Prescription,
    Eticket,
}

impl ArtifactKind {
    /// Filename prefix.
    pub fn prefix(&self) -> &'static str {
        match self {
            ArtifactKind::Prescription => "p",
            ArtifactKind::Eticket => "e",
        }
    }

    /// Table whose `pdf_url` column holds names of this kind.
    pub fn table(&self) -> &'static str {
        match self {
            ArtifactKind::Prescription => "prescription",
            ArtifactKind::Eticket => "eticket",
        }
    }
}

/// Generates a candidate filename using the thread-local RNG.
pub fn generate(kind: ArtifactKind) -> String {
    generate_with(kind, &mut rand::thread_rng())
}

/// Generates a candidate filename from the given RNG.
pub fn generate_with<R: Rng>(kind: ArtifactKind, rng: &mut R) -> String {
    format!(
        "{}-{}-{}.pdf",
        kind.prefix(),
        segment(rng),
        segment(rng)
    )
}

fn segment<R: Rng>(rng: &mut R) -> String {
    (0..SEGMENT_LEN)
        .map(|_| rng.sample(Alphanumeric) as char)
        .collect()
}

/// Name of the extra copy of a main prescription PDF.
pub fn extra_filename(main: &str) -> String {
    format!("e{}", main)
}

/// Checks that `name` has the shape produced by [`generate`].
pub fn is_well_formed(kind: ArtifactKind, name: &str) -> bool {
    let Some(stem) = name
        .strip_prefix(kind.prefix())
        .and_then(|rest| rest.strip_prefix('-'))
        .and_then(|rest| rest.strip_suffix(".pdf"))
    else {
        return false;
    };

    match stem.split_once('-') {
        Some((a, b)) => [a, b]
            .iter()
            .all(|s| s.len() == SEGMENT_LEN && s.chars().all(|c| c.is_ascii_alphanumeric())),
        None => false,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    #[test]
    fn test_generated_names_are_well_formed() {
        let p = generate(ArtifactKind::Prescription);
        let e = generate(ArtifactKind::Eticket);

        assert!(p.starts_with("p-"));
        assert!(e.starts_with("e-"));
        assert!(is_well_formed(ArtifactKind::Prescription, &p), "{}", p);
        assert!(is_well_formed(ArtifactKind::Eticket, &e), "{}", e);
        assert_eq!(p.len(), "p-XXXXXX-XXXXXX.pdf".len());
    }

    #[test]
    fn test_seeded_rng_is_deterministic() {
        let a = generate_with(ArtifactKind::Eticket, &mut StdRng::seed_from_u64(7));
        let b = generate_with(ArtifactKind::Eticket, &mut StdRng::seed_from_u64(7));
        assert_eq!(a, b);
    }

    #[test]
    fn test_candidates_rarely_collide() {
        let mut rng = StdRng::seed_from_u64(42);
        let names: HashSet<String> = (0..1000)
            .map(|_| generate_with(ArtifactKind::Prescription, &mut rng))
            .collect();
        assert_eq!(names.len(), 1000);
    }

    #[test]
    fn test_extra_filename() {
        assert_eq!(extra_filename("p-abcdef-ghijkl.pdf"), "ep-abcdef-ghijkl.pdf");
        assert!(!is_well_formed(ArtifactKind::Prescription, "p-abc-def.pdf"));
    }
}
