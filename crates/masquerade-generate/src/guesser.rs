use regex::Regex;
use serde_json::{Value, json};

use masquerade_core::{ColumnFamily, ColumnInfo, ColumnSpec, Error, GeneratorParam, Result};

/// One name-matching rule: a case-insensitive pattern, the column families
/// it applies to (empty = any) and the generator it proposes.
#[derive(Debug, Clone)]
pub struct GuessRule {
    pattern: Regex,
    families: Vec<ColumnFamily>,
    generator: String,
    params: Vec<Value>,
}

impl GuessRule {
    pub fn new(pattern: &str, generator: impl Into<String>) -> Result<Self> {
        let pattern = Regex::new(&format!("(?i){pattern}"))
            .map_err(|err| Error::config(format!("invalid guess pattern '{pattern}': {err}")))?;
        Ok(Self {
            pattern,
            families: Vec::new(),
            generator: generator.into(),
            params: Vec::new(),
        })
    }

    pub fn for_families(mut self, families: &[ColumnFamily]) -> Self {
        self.families = families.to_vec();
        self
    }

    pub fn with_params(mut self, params: Vec<Value>) -> Self {
        self.params = params;
        self
    }

    fn matches(&self, column: &ColumnInfo) -> bool {
        (self.families.is_empty() || self.families.contains(&column.family))
            && self.pattern.is_match(&column.name)
    }

    fn to_spec(&self) -> ColumnSpec {
        ColumnSpec {
            generator: self.generator.clone(),
            params: self
                .params
                .iter()
                .cloned()
                .map(GeneratorParam::Literal)
                .collect(),
            unique: false,
        }
    }
}

/// Proposes a generator for a column from its name, then its type.
///
/// Rules are tried in order; the first match wins. Columns no rule or type
/// fallback covers (binary, json, unknown types) get no proposal.
#[derive(Debug, Clone)]
pub struct Guesser {
    rules: Vec<GuessRule>,
}

const TEXT: &[ColumnFamily] = &[ColumnFamily::Text];
const NUMERIC: &[ColumnFamily] = &[ColumnFamily::Float, ColumnFamily::Decimal, ColumnFamily::Text];
const TEMPORAL: &[ColumnFamily] = &[ColumnFamily::Date, ColumnFamily::DateTime];

impl Guesser {
    pub fn new(rules: Vec<GuessRule>) -> Self {
        Self { rules }
    }

    pub fn with_default_rules() -> Result<Self> {
        let rules = vec![
            GuessRule::new(r"^(first_?name|fname|given_?name|forename|prenom)$", "firstName")?
                .for_families(TEXT),
            GuessRule::new(r"^(last_?name|lname|surname|family_?name|nom)$", "lastName")?
                .for_families(TEXT),
            GuessRule::new(r"^(name|full_?name|display_?name|contact_?name|author)$", "name")?
                .for_families(TEXT),
            GuessRule::new(r"(user_?name|login|nick_?name|handle)", "userName")?.for_families(TEXT),
            GuessRule::new(r"e_?mail", "safeEmail")?.for_families(TEXT),
            GuessRule::new(r"(phone|mobile|cell|fax|^tel)", "phoneNumber")?.for_families(TEXT),
            GuessRule::new(r"(password|passwd|^pwd$)", "password")?.for_families(TEXT),
            GuessRule::new(r"(street|address_?(line_?)?1$)", "streetAddress")?.for_families(TEXT),
            GuessRule::new(r"address", "address")?.for_families(TEXT),
            GuessRule::new(r"(city|town)", "city")?.for_families(TEXT),
            GuessRule::new(r"(zip|postal|post_?code)", "postcode")?.for_families(TEXT),
            GuessRule::new(r"country_?(code|iso)", "countryCode")?.for_families(TEXT),
            GuessRule::new(r"country", "country")?.for_families(TEXT),
            GuessRule::new(r"(^state$|province|region)", "state")?.for_families(TEXT),
            GuessRule::new(r"(company|organi[sz]ation|employer)", "company")?.for_families(TEXT),
            GuessRule::new(r"(job|occupation|position|^title$)", "jobTitle")?.for_families(TEXT),
            GuessRule::new(r"(^ip$|ip_?addr)", "ipv4")?.for_families(TEXT),
            GuessRule::new(r"(url|website|homepage|link)", "url")?.for_families(TEXT),
            GuessRule::new(r"domain", "domainName")?.for_families(TEXT),
            GuessRule::new(r"(uuid|guid)", "uuid")?
                .for_families(&[ColumnFamily::Uuid, ColumnFamily::Text]),
            GuessRule::new(r"(credit_?card|card_?(number|num|no)|cc_?num)", "creditCardNumber")?
                .for_families(TEXT),
            GuessRule::new(r"currency", "currencyCode")?.for_families(TEXT),
            GuessRule::new(r"colou?r", "hexColor")?.for_families(TEXT),
            GuessRule::new(r"^(lat|latitude)$", "latitude")?.for_families(NUMERIC),
            GuessRule::new(r"^(lng|lon|long|longitude)$", "longitude")?.for_families(NUMERIC),
            GuessRule::new(r"(birth|dob)", "dateTimeBetween")?
                .for_families(TEMPORAL)
                .with_params(vec![json!("-80 years"), json!("-18 years")]),
            GuessRule::new(
                r"(comment|description|note|bio|body|content|message|summary)",
                "paragraph",
            )?
            .for_families(TEXT),
        ];
        Ok(Self::new(rules))
    }

    pub fn rules(&self) -> &[GuessRule] {
        &self.rules
    }

    /// Proposal for `column`, or `None` when nothing fits.
    pub fn guess(&self, column: &ColumnInfo) -> Option<ColumnSpec> {
        if let Some(rule) = self.rules.iter().find(|rule| rule.matches(column)) {
            return Some(rule.to_spec());
        }
        fallback_for(column)
    }
}

fn fallback_for(column: &ColumnInfo) -> Option<ColumnSpec> {
    let (generator, params) = match column.family {
        ColumnFamily::Text => match column.max_length {
            Some(len) if len < 10 => ("lexify", vec![json!("?".repeat(len as usize))]),
            Some(len) if len < 30 => ("word", Vec::new()),
            Some(len) if len < 120 => ("sentence", Vec::new()),
            _ => ("paragraph", Vec::new()),
        },
        ColumnFamily::Integer => {
            let max = integer_ceiling(&column.sql_type, column.unsigned);
            ("numberBetween", vec![json!(0), json!(max)])
        }
        ColumnFamily::Decimal | ColumnFamily::Float => {
            ("randomFloat", vec![json!(2), json!(0), json!(10_000)])
        }
        ColumnFamily::Boolean => ("boolean", Vec::new()),
        ColumnFamily::Date => ("date", Vec::new()),
        ColumnFamily::DateTime => ("dateTime", Vec::new()),
        ColumnFamily::Time => ("time", Vec::new()),
        ColumnFamily::Uuid => ("uuid", Vec::new()),
        ColumnFamily::Binary | ColumnFamily::Json | ColumnFamily::Other => return None,
    };
    Some(ColumnSpec {
        generator: generator.to_string(),
        params: params.into_iter().map(GeneratorParam::Literal).collect(),
        unique: false,
    })
}

fn integer_ceiling(sql_type: &str, unsigned: bool) -> i64 {
    let sql_type = sql_type.to_ascii_lowercase();
    let max = if sql_type.starts_with("tinyint") {
        127
    } else if sql_type.starts_with("smallint") || sql_type.starts_with("int2") {
        32_767
    } else if sql_type.starts_with("mediumint") {
        8_388_607
    } else {
        2_147_483_647
    };
    if unsigned { max * 2 + 1 } else { max }
}
