//! Pure lookups from declared records to live ones.

use orgsync_core::{LiveAccount, LiveOu};

/// A way of resolving an OU reference, tried in [`OU_MATCH_ORDER`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OuMatchStrategy {
    /// The reference equals the OU's full path.
    ExactPath,
    /// The reference equals the OU's name, at any depth.
    NameOnly,
}

pub const OU_MATCH_ORDER: [OuMatchStrategy; 2] = [OuMatchStrategy::ExactPath, OuMatchStrategy::NameOnly];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OuMatch<'a> {
    Found {
        ou: &'a LiveOu,
        strategy: OuMatchStrategy,
    },
    /// The name-only fallback hit more than one OU.
    Ambiguous(Vec<&'a LiveOu>),
    NotFound,
}

impl<'a> OuMatch<'a> {
    pub fn found(&self) -> Option<&'a LiveOu> {
        match self {
            OuMatch::Found { ou, .. } => Some(*ou),
            _ => None,
        }
    }
}

/// Resolve an OU reference (path or bare name).
///
/// Paths are unique, so an exact-path hit always wins and is never ambiguous. Only when no
/// path matches does a bare name fall back to every OU carrying that name; more than one
/// candidate is reported instead of picking the first.
pub fn match_ou<'a>(reference: &str, ous: &'a [LiveOu]) -> OuMatch<'a> {
    for strategy in OU_MATCH_ORDER {
        let candidates: Vec<&LiveOu> = match strategy {
            OuMatchStrategy::ExactPath => ous.iter().filter(|o| o.path == reference).collect(),
            OuMatchStrategy::NameOnly => ous.iter().filter(|o| o.name == reference).collect(),
        };
        match candidates.len() {
            0 => continue,
            1 => {
                return OuMatch::Found {
                    ou: candidates[0],
                    strategy,
                }
            }
            _ => return OuMatch::Ambiguous(candidates),
        }
    }
    OuMatch::NotFound
}

/// The live account whose email equals `email`, ignoring case.
pub fn match_account<'a, I>(email: &str, accounts: I) -> Option<&'a LiveAccount>
where
    I: IntoIterator<Item = &'a LiveAccount>,
{
    accounts
        .into_iter()
        .find(|a| a.email.eq_ignore_ascii_case(email))
}
