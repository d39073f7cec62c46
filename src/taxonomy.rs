//! The closed taxonomy of minute-book sections.
//!
//! The model is asked to use the exact display names listed here, but it
//! regularly paraphrases ("By-Law No. 1", "Register of Directors"). Labels
//! are therefore matched leniently: case, punctuation and whitespace are
//! ignored and a short alias table covers the common variants. Anything that
//! still does not match becomes [`SectionType::Unclassified`] — a label is
//! never a reason to reject a section.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// One kind of section in a corporate minute book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SectionType {
    ArticlesAndAmendments,
    Bylaws,
    UnanimousShareholderAgreement,
    Resolutions,
    SignaturePages,
    DirectorsRegister,
    OfficersRegister,
    ShareholdersRegister,
    SecuritiesRegister,
    TransfersRegister,
    /// Pages the model did not label, labelled with an unknown name, or
    /// gaps filled by the boundary corrector.
    Unclassified,
}

impl SectionType {
    /// Every classifiable type, in the order sections typically appear.
    /// `Unclassified` is deliberately absent: the model is never asked for it.
    pub const CLASSIFIABLE: [SectionType; 10] = [
        SectionType::ArticlesAndAmendments,
        SectionType::Bylaws,
        SectionType::UnanimousShareholderAgreement,
        SectionType::Resolutions,
        SectionType::SignaturePages,
        SectionType::DirectorsRegister,
        SectionType::OfficersRegister,
        SectionType::ShareholdersRegister,
        SectionType::SecuritiesRegister,
        SectionType::TransfersRegister,
    ];

    /// Canonical name used in prompts and in the output file.
    pub fn display_name(self) -> &'static str {
        match self {
            SectionType::ArticlesAndAmendments => "Articles & Amendments",
            SectionType::Bylaws => "By Laws",
            SectionType::UnanimousShareholderAgreement => "Unanimous Shareholder Agreement",
            SectionType::Resolutions => "Resolutions & Minutes",
            SectionType::SignaturePages => "Signature Pages",
            SectionType::DirectorsRegister => "Directors Register",
            SectionType::OfficersRegister => "Officers Register",
            SectionType::ShareholdersRegister => "Shareholders Register",
            SectionType::SecuritiesRegister => "Securities Register",
            SectionType::TransfersRegister => "Transfers Register",
            SectionType::Unclassified => "Unclassified",
        }
    }

    /// Match a model-supplied label against the taxonomy.
    ///
    /// Returns `None` when the label is not recognised; callers map that to
    /// [`SectionType::Unclassified`] and record a warning.
    pub fn from_label(label: &str) -> Option<SectionType> {
        let key = normalise(label);
        if key.is_empty() {
            return None;
        }

        if let Some(t) = SectionType::CLASSIFIABLE
            .iter()
            .chain(std::iter::once(&SectionType::Unclassified))
            .find(|t| normalise(t.display_name()) == key)
        {
            return Some(*t);
        }

        ALIASES
            .iter()
            .find(|(alias, _)| *alias == key)
            .map(|(_, t)| *t)
    }

    /// Lenient parse: unknown labels become `Unclassified`.
    pub fn from_label_or_unclassified(label: &str) -> SectionType {
        Self::from_label(label).unwrap_or(SectionType::Unclassified)
    }

    /// Bulleted list of classifiable names for prompt templates.
    pub fn prompt_list() -> String {
        SectionType::CLASSIFIABLE
            .iter()
            .map(|t| format!("- {}", t.display_name()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl fmt::Display for SectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.display_name())
    }
}

impl Serialize for SectionType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.display_name())
    }
}

impl<'de> Deserialize<'de> for SectionType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        Ok(SectionType::from_label_or_unclassified(&label))
    }
}

/// Lower-case alphanumerics only: "By-Laws" and "by laws" compare equal.
fn normalise(label: &str) -> String {
    label
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Normalised alias → type.
const ALIASES: &[(&str, SectionType)] = &[
    ("articles", SectionType::ArticlesAndAmendments),
    ("articlesofincorporation", SectionType::ArticlesAndAmendments),
    ("articlesandamendments", SectionType::ArticlesAndAmendments),
    ("amendments", SectionType::ArticlesAndAmendments),
    ("bylaw", SectionType::Bylaws),
    ("bylaws", SectionType::Bylaws),
    ("generalbylaw", SectionType::Bylaws),
    ("usa", SectionType::UnanimousShareholderAgreement),
    ("shareholderagreement", SectionType::UnanimousShareholderAgreement),
    ("unanimousshareholdersagreement", SectionType::UnanimousShareholderAgreement),
    ("resolution", SectionType::Resolutions),
    ("resolutions", SectionType::Resolutions),
    ("minutes", SectionType::Resolutions),
    ("resolutionsandminutes", SectionType::Resolutions),
    ("signaturepage", SectionType::SignaturePages),
    ("signatures", SectionType::SignaturePages),
    ("directors", SectionType::DirectorsRegister),
    ("registerofdirectors", SectionType::DirectorsRegister),
    ("directorsregister", SectionType::DirectorsRegister),
    ("officers", SectionType::OfficersRegister),
    ("registerofofficers", SectionType::OfficersRegister),
    ("shareholders", SectionType::ShareholdersRegister),
    ("registerofshareholders", SectionType::ShareholdersRegister),
    ("securities", SectionType::SecuritiesRegister),
    ("registerofsecurities", SectionType::SecuritiesRegister),
    ("securitiesregister", SectionType::SecuritiesRegister),
    ("transfers", SectionType::TransfersRegister),
    ("registeroftransfers", SectionType::TransfersRegister),
    ("transferregister", SectionType::TransfersRegister),
    ("securitiestransferregister", SectionType::TransfersRegister),
    ("other", SectionType::Unclassified),
    ("unknown", SectionType::Unclassified),
];
