//! Parsed search parameters
//!
//! The wire form `name[:modifier]=[prefix]value[,value...]` parsed into a
//! structured [`ParsedParam`], including chained references
//! (`subject:Patient.name=Smith`).

/// Comparison prefix on date/number values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchPrefix {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Sa,
    Eb,
    Ap,
}

impl SearchPrefix {
    /// Split a leading prefix off a search value.
    pub fn parse_prefix(value: &str) -> (Option<Self>, &str) {
        let candidates = [
            ("eq", Self::Eq),
            ("ne", Self::Ne),
            ("lt", Self::Lt),
            ("gt", Self::Gt),
            ("le", Self::Le),
            ("ge", Self::Ge),
            ("sa", Self::Sa),
            ("eb", Self::Eb),
            ("ap", Self::Ap),
        ];
        for (s, p) in candidates {
            if let Some(rest) = value.strip_prefix(s) {
                // A prefix is only a prefix when followed by the value proper
                if rest.chars().next().map(|c| c.is_ascii_digit()).unwrap_or(false) {
                    return (Some(p), rest);
                }
            }
        }
        (None, value)
    }

    /// SQL comparison operator; `Ap` has no single operator (BETWEEN window).
    pub fn sql_operator(&self) -> Option<&'static str> {
        match self {
            Self::Eq => Some("="),
            Self::Ne => Some("<>"),
            Self::Lt => Some("<"),
            Self::Gt => Some(">"),
            Self::Le => Some("<="),
            Self::Ge => Some(">="),
            Self::Sa => Some(">"),
            Self::Eb => Some("<"),
            Self::Ap => None,
        }
    }
}

/// Search modifier (`name:exact=...`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchModifier {
    Exact,
    Contains,
    Text,
    Not,
    Missing,
    /// Resource-type modifier on reference parameters (`subject:Patient`)
    TypeModifier(String),
}

impl SearchModifier {
    pub fn from_token(s: &str) -> Option<Self> {
        match s {
            "exact" => Some(Self::Exact),
            "contains" => Some(Self::Contains),
            "text" => Some(Self::Text),
            "not" => Some(Self::Not),
            "missing" => Some(Self::Missing),
            _ => {
                // A capitalized token is a resource-type modifier
                if s.chars().next().map(|c| c.is_ascii_uppercase()).unwrap_or(false)
                    && s.chars().all(|c| c.is_ascii_alphanumeric())
                {
                    Some(Self::TypeModifier(s.to_string()))
                } else {
                    None
                }
            }
        }
    }
}

/// One OR-value of a parameter, with its comparison prefix split off.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchValue {
    pub raw: String,
    pub prefix: Option<SearchPrefix>,
}

impl SearchValue {
    pub fn parse(value: &str) -> Self {
        let (prefix, rest) = SearchPrefix::parse_prefix(value);
        Self {
            raw: rest.to_string(),
            prefix,
        }
    }
}

/// A chained search step: the target resource type and the parameter applied
/// to it.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainedParam {
    pub target_type: String,
    pub param: ParsedParam,
}

/// One parsed search parameter occurrence.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedParam {
    pub code: String,
    pub modifier: Option<SearchModifier>,
    /// OR values for this occurrence
    pub values: Vec<SearchValue>,
    pub chain: Option<Box<ChainedParam>>,
}

impl ParsedParam {
    pub fn new(code: impl Into<String>, values: Vec<SearchValue>) -> Self {
        Self {
            code: code.into(),
            modifier: None,
            values,
            chain: None,
        }
    }
}

/// Parse one `name=value` pair into a [`ParsedParam`].
///
/// `subject:Patient.name=Smith` becomes code `subject` with a chain into
/// `Patient.name`; commas separate OR values; date/number prefixes are
/// split per value.
pub fn parse_parameter(name: &str, value: &str) -> ParsedParam {
    // Chain step: everything after the first '.' applies to the target
    let (head, chain_rest) = match name.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (name, None),
    };

    let (code, modifier) = match head.split_once(':') {
        Some((code, token)) => (code, SearchModifier::from_token(token)),
        None => (head, None),
    };

    if let Some(rest) = chain_rest {
        if let Some(SearchModifier::TypeModifier(target_type)) = &modifier {
            let chained = parse_parameter(rest, value);
            return ParsedParam {
                code: code.to_string(),
                modifier: None,
                values: Vec::new(),
                chain: Some(Box::new(ChainedParam {
                    target_type: target_type.clone(),
                    param: chained,
                })),
            };
        }
    }

    let values = value.split(',').map(SearchValue::parse).collect();
    ParsedParam {
        code: code.to_string(),
        modifier,
        values,
        chain: None,
    }
}
