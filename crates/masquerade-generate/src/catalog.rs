use std::collections::BTreeMap;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use fake::Fake;
use fake::locales::{EN, FR_FR, PT_BR};
use rand::distr::Distribution;
use rand::{Rng, RngCore};
use serde_json::Value;

use masquerade_core::{ColumnFamily, Error, Result, SqlValue};

use crate::locale::Locale;
use crate::params::Params;

/// Type of value a generator is documented to produce.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueKind {
    Text,
    Integer,
    Float,
    Boolean,
    Date,
    DateTime,
    Time,
    Uuid,
    /// Follows the type of the configured parameters (`randomElement`).
    Any,
}

impl ValueKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ValueKind::Text => "text",
            ValueKind::Integer => "integer",
            ValueKind::Float => "float",
            ValueKind::Boolean => "boolean",
            ValueKind::Date => "date",
            ValueKind::DateTime => "datetime",
            ValueKind::Time => "time",
            ValueKind::Uuid => "uuid",
            ValueKind::Any => "any",
        }
    }

    /// Whether values of this kind may be written to a column of `family`.
    ///
    /// Temporal values never target text columns; columns of unknown
    /// family accept anything.
    pub fn is_compatible_with(self, family: ColumnFamily) -> bool {
        use ColumnFamily as F;
        match (self, family) {
            (_, F::Other) | (ValueKind::Any, _) => true,
            (ValueKind::Text, F::Text) => true,
            (ValueKind::Integer, F::Integer | F::Decimal | F::Float | F::Text) => true,
            (ValueKind::Float, F::Decimal | F::Float | F::Text) => true,
            (ValueKind::Boolean, F::Boolean | F::Integer | F::Text) => true,
            (ValueKind::Date | ValueKind::DateTime, F::Date | F::DateTime) => true,
            (ValueKind::Time, F::Time) => true,
            (ValueKind::Uuid, F::Uuid | F::Text) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Run-wide inputs shared by every generator call.
#[derive(Debug, Clone, Copy)]
pub struct GeneratorContext {
    pub locale: Locale,
    /// Reference instant for relative dates, fixed for the whole run.
    pub now: NaiveDateTime,
}

/// A named source of synthetic values.
pub trait Generator: Send + Sync {
    fn name(&self) -> &'static str;

    fn kind(&self) -> ValueKind;

    /// Generators with a tiny value space (e.g. `boolean`) cannot be unique.
    fn unique_capable(&self) -> bool {
        true
    }

    fn generate(
        &self,
        ctx: &GeneratorContext,
        params: &Params<'_>,
        rng: &mut dyn RngCore,
    ) -> Result<SqlValue>;
}

type GenerateFn = fn(&GeneratorContext, &Params<'_>, &mut dyn RngCore) -> Result<SqlValue>;

/// Built-in generator described by a catalog row.
#[derive(Clone, Copy)]
pub struct GeneratorSpec {
    pub name: &'static str,
    pub kind: ValueKind,
    pub unique_capable: bool,
    pub max_params: usize,
    /// Parameter synopsis shown by `config validate`.
    pub usage: &'static str,
    generate: GenerateFn,
}

impl GeneratorSpec {
    const fn new(
        name: &'static str,
        kind: ValueKind,
        usage: &'static str,
        max_params: usize,
        generate: GenerateFn,
    ) -> Self {
        Self {
            name,
            kind,
            unique_capable: true,
            max_params,
            usage,
            generate,
        }
    }

    const fn never_unique(mut self) -> Self {
        self.unique_capable = false;
        self
    }
}

impl fmt::Debug for GeneratorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratorSpec")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("unique_capable", &self.unique_capable)
            .finish()
    }
}

impl Generator for GeneratorSpec {
    fn name(&self) -> &'static str {
        self.name
    }

    fn kind(&self) -> ValueKind {
        self.kind
    }

    fn unique_capable(&self) -> bool {
        self.unique_capable
    }

    fn generate(
        &self,
        ctx: &GeneratorContext,
        params: &Params<'_>,
        rng: &mut dyn RngCore,
    ) -> Result<SqlValue> {
        if params.len() > self.max_params && self.max_params != VARIADIC {
            return Err(Error::config(format!(
                "generator '{}' takes at most {} parameter(s), got {}: {}({})",
                self.name,
                self.max_params,
                params.len(),
                self.name,
                self.usage
            )));
        }
        (self.generate)(ctx, params, rng)
    }
}

/// Generators available to a run, keyed by name.
pub struct GeneratorRegistry {
    generators: BTreeMap<&'static str, Box<dyn Generator>>,
}

impl GeneratorRegistry {
    pub fn empty() -> Self {
        Self {
            generators: BTreeMap::new(),
        }
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        for spec in BUILTIN {
            registry.register_generator(Box::new(*spec));
        }
        registry
    }

    /// Register a generator, replacing any previous one with the same name.
    pub fn register_generator(&mut self, generator: Box<dyn Generator>) {
        self.generators.insert(generator.name(), generator);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Generator> {
        self.generators.get(name).map(|generator| generator.as_ref())
    }

    pub fn resolve(&self, name: &str) -> Result<&dyn Generator> {
        self.get(name)
            .ok_or_else(|| Error::config(format!("unknown generator '{name}'")))
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.generators.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.generators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.generators.is_empty()
    }
}

impl Default for GeneratorRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl fmt::Debug for GeneratorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.generators.keys()).finish()
    }
}

/// Catalog rows for the built-in generators.
pub fn builtin_specs() -> &'static [GeneratorSpec] {
    BUILTIN
}

const VARIADIC: usize = usize::MAX;

const BUILTIN: &[GeneratorSpec] = &[
    // person
    GeneratorSpec::new("firstName", ValueKind::Text, "", 0, first_name),
    GeneratorSpec::new("lastName", ValueKind::Text, "", 0, last_name),
    GeneratorSpec::new("name", ValueKind::Text, "", 0, full_name),
    GeneratorSpec::new("title", ValueKind::Text, "", 0, title),
    GeneratorSpec::new("userName", ValueKind::Text, "", 0, user_name),
    GeneratorSpec::new("email", ValueKind::Text, "", 0, free_email),
    GeneratorSpec::new("safeEmail", ValueKind::Text, "", 0, safe_email),
    GeneratorSpec::new("phoneNumber", ValueKind::Text, "", 0, phone_number),
    GeneratorSpec::new("password", ValueKind::Text, "minLength=8, maxLength=20", 2, password),
    // address
    GeneratorSpec::new("streetName", ValueKind::Text, "", 0, street_name),
    GeneratorSpec::new("buildingNumber", ValueKind::Text, "", 0, building_number),
    GeneratorSpec::new("streetAddress", ValueKind::Text, "", 0, street_address),
    GeneratorSpec::new("address", ValueKind::Text, "", 0, address),
    GeneratorSpec::new("city", ValueKind::Text, "", 0, city),
    GeneratorSpec::new("postcode", ValueKind::Text, "", 0, postcode),
    GeneratorSpec::new("state", ValueKind::Text, "", 0, state),
    GeneratorSpec::new("country", ValueKind::Text, "", 0, country),
    GeneratorSpec::new("countryCode", ValueKind::Text, "", 0, country_code),
    GeneratorSpec::new("latitude", ValueKind::Float, "min=-90, max=90", 2, latitude),
    GeneratorSpec::new("longitude", ValueKind::Float, "min=-180, max=180", 2, longitude),
    // company
    GeneratorSpec::new("company", ValueKind::Text, "", 0, company),
    GeneratorSpec::new("catchPhrase", ValueKind::Text, "", 0, catch_phrase),
    GeneratorSpec::new("jobTitle", ValueKind::Text, "", 0, job_title),
    GeneratorSpec::new("creditCardNumber", ValueKind::Text, "", 0, credit_card_number),
    GeneratorSpec::new("currencyCode", ValueKind::Text, "", 0, currency_code),
    // internet
    GeneratorSpec::new("domainName", ValueKind::Text, "", 0, domain_name),
    GeneratorSpec::new("url", ValueKind::Text, "", 0, url),
    GeneratorSpec::new("ipv4", ValueKind::Text, "", 0, ipv4),
    GeneratorSpec::new("ipv6", ValueKind::Text, "", 0, ipv6),
    GeneratorSpec::new("macAddress", ValueKind::Text, "", 0, mac_address),
    GeneratorSpec::new("hexColor", ValueKind::Text, "", 0, hex_color),
    GeneratorSpec::new("uuid", ValueKind::Uuid, "", 0, uuid_v4),
    // lorem
    GeneratorSpec::new("word", ValueKind::Text, "", 0, word),
    GeneratorSpec::new("words", ValueKind::Text, "nb=3", 1, words),
    GeneratorSpec::new("sentence", ValueKind::Text, "nbWords=6", 1, sentence),
    GeneratorSpec::new("paragraph", ValueKind::Text, "nbSentences=3", 1, paragraph),
    GeneratorSpec::new("text", ValueKind::Text, "maxNbChars=200", 1, text),
    // numbers
    GeneratorSpec::new("randomDigit", ValueKind::Integer, "", 0, random_digit),
    GeneratorSpec::new("randomDigitNotNull", ValueKind::Integer, "", 0, random_digit_not_null),
    GeneratorSpec::new("randomNumber", ValueKind::Integer, "nbDigits, strict=false", 2, random_number),
    GeneratorSpec::new("numberBetween", ValueKind::Integer, "min=0, max=2147483647", 2, number_between),
    GeneratorSpec::new("randomFloat", ValueKind::Float, "nbMaxDecimals=2, min=0, max=10000", 3, random_float),
    GeneratorSpec::new("boolean", ValueKind::Boolean, "chanceOfGettingTrue=50", 1, boolean)
        .never_unique(),
    // dates
    GeneratorSpec::new("date", ValueKind::Date, "max=now", 1, date),
    GeneratorSpec::new("dateBetween", ValueKind::Date, "start=-30 years, end=now", 2, date_between),
    GeneratorSpec::new("dateTime", ValueKind::DateTime, "max=now", 1, date_time),
    GeneratorSpec::new("dateTimeBetween", ValueKind::DateTime, "start=-30 years, end=now", 2, date_time_between),
    GeneratorSpec::new("time", ValueKind::Time, "", 0, time),
    GeneratorSpec::new("unixTime", ValueKind::Integer, "max=now", 1, unix_time),
    // patterns
    GeneratorSpec::new("randomLetter", ValueKind::Text, "", 0, random_letter),
    GeneratorSpec::new("randomElement", ValueKind::Any, "[a, b, ...]", VARIADIC, random_element),
    GeneratorSpec::new("numerify", ValueKind::Text, "format=###", 1, numerify),
    GeneratorSpec::new("lexify", ValueKind::Text, "format=????", 1, lexify),
    GeneratorSpec::new("bothify", ValueKind::Text, "format=## ??", 1, bothify),
    GeneratorSpec::new("regexify", ValueKind::Text, "pattern", 1, regexify),
];

macro_rules! localized {
    ($ctx:expr, $rng:expr, $module:ident :: $faker:ident) => {{
        let value: String = match $ctx.locale {
            Locale::EnUs => fake::faker::$module::raw::$faker(EN).fake_with_rng($rng),
            Locale::FrFr => fake::faker::$module::raw::$faker(FR_FR).fake_with_rng($rng),
            Locale::PtBr => fake::faker::$module::raw::$faker(PT_BR).fake_with_rng($rng),
        };
        value
    }};
}

macro_rules! text_generators {
    ($($fn_name:ident => $module:ident :: $faker:ident),* $(,)?) => {
        $(
            fn $fn_name(
                ctx: &GeneratorContext,
                _params: &Params<'_>,
                rng: &mut dyn RngCore,
            ) -> Result<SqlValue> {
                Ok(SqlValue::Text(localized!(ctx, rng, $module::$faker)))
            }
        )*
    };
}

text_generators! {
    first_name => name::FirstName,
    last_name => name::LastName,
    full_name => name::Name,
    title => name::Title,
    user_name => internet::Username,
    free_email => internet::FreeEmail,
    safe_email => internet::SafeEmail,
    phone_number => phone_number::PhoneNumber,
    street_name => address::StreetName,
    building_number => address::BuildingNumber,
    city => address::CityName,
    postcode => address::PostCode,
    state => address::StateName,
    country => address::CountryName,
    country_code => address::CountryCode,
    company => company::CompanyName,
    catch_phrase => company::CatchPhrase,
    job_title => job::Title,
    credit_card_number => creditcard::CreditCardNumber,
    currency_code => currency::CurrencyCode,
    word => lorem::Word,
    ipv4 => internet::IPv4,
    ipv6 => internet::IPv6,
    mac_address => internet::MACAddress,
}

fn street_address(ctx: &GeneratorContext, _params: &Params<'_>, rng: &mut dyn RngCore) -> Result<SqlValue> {
    Ok(SqlValue::Text(compose_street(ctx, rng)))
}

fn address(ctx: &GeneratorContext, _params: &Params<'_>, rng: &mut dyn RngCore) -> Result<SqlValue> {
    let street = compose_street(ctx, rng);
    let postcode = localized!(ctx, rng, address::PostCode);
    let city = localized!(ctx, rng, address::CityName);
    Ok(SqlValue::Text(format!("{street}, {postcode} {city}")))
}

fn compose_street(ctx: &GeneratorContext, rng: &mut dyn RngCore) -> String {
    let number = localized!(ctx, rng, address::BuildingNumber);
    let street = localized!(ctx, rng, address::StreetName);
    match ctx.locale {
        Locale::EnUs => format!("{number} {street}"),
        Locale::FrFr | Locale::PtBr => format!("{street}, {number}"),
    }
}

fn password(_ctx: &GeneratorContext, params: &Params<'_>, rng: &mut dyn RngCore) -> Result<SqlValue> {
    let min = params.count(0, 8)?.max(1);
    let max = params.count(1, 20)?.max(min);
    let value: String = fake::faker::internet::en::Password(min..max + 1).fake_with_rng(rng);
    Ok(SqlValue::Text(value))
}

fn latitude(_ctx: &GeneratorContext, params: &Params<'_>, rng: &mut dyn RngCore) -> Result<SqlValue> {
    coordinate(params, -90.0, 90.0, rng)
}

fn longitude(_ctx: &GeneratorContext, params: &Params<'_>, rng: &mut dyn RngCore) -> Result<SqlValue> {
    coordinate(params, -180.0, 180.0, rng)
}

fn coordinate(params: &Params<'_>, min: f64, max: f64, rng: &mut dyn RngCore) -> Result<SqlValue> {
    let (min, max) = ordered(params.float(0, min)?, params.float(1, max)?);
    Ok(SqlValue::Float(round_to(float_between(min, max, rng), 6)))
}

fn domain_name(_ctx: &GeneratorContext, _params: &Params<'_>, rng: &mut dyn RngCore) -> Result<SqlValue> {
    Ok(SqlValue::Text(compose_domain(rng)))
}

fn url(_ctx: &GeneratorContext, _params: &Params<'_>, rng: &mut dyn RngCore) -> Result<SqlValue> {
    let domain = compose_domain(rng);
    let path: String = fake::faker::lorem::en::Word().fake_with_rng(rng);
    Ok(SqlValue::Text(format!("https://www.{domain}/{path}")))
}

fn compose_domain(rng: &mut dyn RngCore) -> String {
    let word: String = fake::faker::lorem::en::Word().fake_with_rng(rng);
    let suffix: String = fake::faker::internet::en::DomainSuffix().fake_with_rng(rng);
    format!("{}.{suffix}", word.to_lowercase())
}

fn hex_color(_ctx: &GeneratorContext, _params: &Params<'_>, rng: &mut dyn RngCore) -> Result<SqlValue> {
    Ok(SqlValue::Text(format!("#{:06x}", rng.random_range(0..=0xFF_FFFFu32))))
}

fn uuid_v4(_ctx: &GeneratorContext, _params: &Params<'_>, rng: &mut dyn RngCore) -> Result<SqlValue> {
    let mut bytes = [0u8; 16];
    rng.fill_bytes(&mut bytes);
    Ok(SqlValue::Uuid(uuid::Builder::from_random_bytes(bytes).into_uuid()))
}

fn words(_ctx: &GeneratorContext, params: &Params<'_>, rng: &mut dyn RngCore) -> Result<SqlValue> {
    let count = params.count(0, 3)?.max(1);
    let words: Vec<String> = fake::faker::lorem::en::Words(count..count + 1).fake_with_rng(rng);
    Ok(SqlValue::Text(words.join(" ")))
}

fn sentence(_ctx: &GeneratorContext, params: &Params<'_>, rng: &mut dyn RngCore) -> Result<SqlValue> {
    let count = params.count(0, 6)?.max(1);
    Ok(SqlValue::Text(make_sentence(count, rng)))
}

fn paragraph(_ctx: &GeneratorContext, params: &Params<'_>, rng: &mut dyn RngCore) -> Result<SqlValue> {
    let count = params.count(0, 3)?.max(1);
    let sentences: Vec<String> = (0..count).map(|_| make_sentence(6, rng)).collect();
    Ok(SqlValue::Text(sentences.join(" ")))
}

fn text(_ctx: &GeneratorContext, params: &Params<'_>, rng: &mut dyn RngCore) -> Result<SqlValue> {
    let max_chars = params.count(0, 200)?;
    if max_chars < 5 {
        return Err(Error::config(
            "generator 'text' requires maxNbChars of at least 5",
        ));
    }
    let mut out = String::new();
    loop {
        let next = make_sentence(6, rng);
        let needed = if out.is_empty() { next.len() } else { next.len() + 1 };
        if out.len() + needed > max_chars {
            break;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(&next);
    }
    if out.is_empty() {
        let word: String = fake::faker::lorem::en::Word().fake_with_rng(rng);
        out = word.chars().take(max_chars - 1).collect::<String>() + ".";
    }
    Ok(SqlValue::Text(out))
}

/// A capitalised sentence of roughly `nb_words` words (+/- 40%).
fn make_sentence(nb_words: usize, rng: &mut dyn RngCore) -> String {
    let low = (nb_words * 60 / 100).max(1);
    let high = (nb_words * 140 / 100).max(low);
    let count = rng.random_range(low..=high);
    let words: Vec<String> = fake::faker::lorem::en::Words(count..count + 1).fake_with_rng(rng);
    let mut sentence = words.join(" ");
    if let Some(first) = sentence.get(..1) {
        let upper = first.to_uppercase();
        sentence.replace_range(..1, &upper);
    }
    sentence.push('.');
    sentence
}

fn random_digit(_ctx: &GeneratorContext, _params: &Params<'_>, rng: &mut dyn RngCore) -> Result<SqlValue> {
    Ok(SqlValue::Int(rng.random_range(0..=9)))
}

fn random_digit_not_null(_ctx: &GeneratorContext, _params: &Params<'_>, rng: &mut dyn RngCore) -> Result<SqlValue> {
    Ok(SqlValue::Int(rng.random_range(1..=9)))
}

fn random_number(_ctx: &GeneratorContext, params: &Params<'_>, rng: &mut dyn RngCore) -> Result<SqlValue> {
    let digits = match params.get(0) {
        Some(_) => params.count(0, 0)?,
        None => rng.random_range(1..=9),
    };
    if digits == 0 || digits > 18 {
        return Err(Error::config(format!(
            "generator 'randomNumber' nbDigits must be between 1 and 18, got {digits}"
        )));
    }
    let strict = params.bool(1, false)?;
    let max = 10i64.pow(digits as u32) - 1;
    let min = if strict { 10i64.pow(digits as u32 - 1) } else { 0 };
    Ok(SqlValue::Int(rng.random_range(min..=max)))
}

fn number_between(_ctx: &GeneratorContext, params: &Params<'_>, rng: &mut dyn RngCore) -> Result<SqlValue> {
    let (min, max) = ordered(params.int(0, 0)?, params.int(1, i64::from(i32::MAX))?);
    Ok(SqlValue::Int(rng.random_range(min..=max)))
}

fn random_float(_ctx: &GeneratorContext, params: &Params<'_>, rng: &mut dyn RngCore) -> Result<SqlValue> {
    let decimals = params.count(0, 2)?.min(10);
    let (min, max) = ordered(params.float(1, 0.0)?, params.float(2, 10_000.0)?);
    Ok(SqlValue::Float(round_to(float_between(min, max, rng), decimals)))
}

fn boolean(_ctx: &GeneratorContext, params: &Params<'_>, rng: &mut dyn RngCore) -> Result<SqlValue> {
    let chance = params.int(0, 50)?.clamp(0, 100);
    Ok(SqlValue::Bool(rng.random_range(1..=100) <= chance))
}

fn date(ctx: &GeneratorContext, params: &Params<'_>, rng: &mut dyn RngCore) -> Result<SqlValue> {
    let max = params.datetime(0, "now", ctx.now)?;
    let start = epoch()?;
    Ok(SqlValue::Date(datetime_between(start, max, rng).date()))
}

fn date_between(ctx: &GeneratorContext, params: &Params<'_>, rng: &mut dyn RngCore) -> Result<SqlValue> {
    let start = params.datetime(0, "-30 years", ctx.now)?;
    let end = params.datetime(1, "now", ctx.now)?;
    Ok(SqlValue::Date(datetime_between(start, end, rng).date()))
}

fn date_time(ctx: &GeneratorContext, params: &Params<'_>, rng: &mut dyn RngCore) -> Result<SqlValue> {
    let max = params.datetime(0, "now", ctx.now)?;
    let start = epoch()?;
    Ok(SqlValue::Timestamp(datetime_between(start, max, rng)))
}

fn date_time_between(ctx: &GeneratorContext, params: &Params<'_>, rng: &mut dyn RngCore) -> Result<SqlValue> {
    let start = params.datetime(0, "-30 years", ctx.now)?;
    let end = params.datetime(1, "now", ctx.now)?;
    Ok(SqlValue::Timestamp(datetime_between(start, end, rng)))
}

fn time(_ctx: &GeneratorContext, _params: &Params<'_>, rng: &mut dyn RngCore) -> Result<SqlValue> {
    let seconds = rng.random_range(0..86_400u32);
    let value = NaiveTime::from_num_seconds_from_midnight_opt(seconds, 0).unwrap_or(NaiveTime::MIN);
    Ok(SqlValue::Time(value))
}

fn unix_time(ctx: &GeneratorContext, params: &Params<'_>, rng: &mut dyn RngCore) -> Result<SqlValue> {
    let max = params.datetime(0, "now", ctx.now)?.and_utc().timestamp().max(0);
    Ok(SqlValue::Int(rng.random_range(0..=max)))
}

fn epoch() -> Result<NaiveDateTime> {
    NaiveDate::from_ymd_opt(1970, 1, 1)
        .map(|date| date.and_time(NaiveTime::MIN))
        .ok_or_else(|| Error::config("unix epoch is not representable"))
}

fn datetime_between(start: NaiveDateTime, end: NaiveDateTime, rng: &mut dyn RngCore) -> NaiveDateTime {
    let (start, end) = ordered(start, end);
    let span = (end - start).num_seconds();
    let offset = rng.random_range(0..=span);
    start + chrono::Duration::seconds(offset)
}

fn random_letter(_ctx: &GeneratorContext, _params: &Params<'_>, rng: &mut dyn RngCore) -> Result<SqlValue> {
    Ok(SqlValue::Text(letter(rng).to_string()))
}

fn random_element(_ctx: &GeneratorContext, params: &Params<'_>, rng: &mut dyn RngCore) -> Result<SqlValue> {
    let items = params.list(0);
    if items.is_empty() {
        return Err(Error::config(
            "generator 'randomElement' requires at least one element",
        ));
    }
    let picked = &items[rng.random_range(0..items.len())];
    Ok(match picked {
        Value::Array(_) | Value::Object(_) => SqlValue::Text(picked.to_string()),
        other => SqlValue::from_json(other),
    })
}

fn numerify(_ctx: &GeneratorContext, params: &Params<'_>, rng: &mut dyn RngCore) -> Result<SqlValue> {
    let format = params.string(0)?.unwrap_or_else(|| "###".to_string());
    Ok(SqlValue::Text(replace_placeholders(&format, true, false, rng)))
}

fn lexify(_ctx: &GeneratorContext, params: &Params<'_>, rng: &mut dyn RngCore) -> Result<SqlValue> {
    let format = params.string(0)?.unwrap_or_else(|| "????".to_string());
    Ok(SqlValue::Text(replace_placeholders(&format, false, true, rng)))
}

fn bothify(_ctx: &GeneratorContext, params: &Params<'_>, rng: &mut dyn RngCore) -> Result<SqlValue> {
    let format = params.string(0)?.unwrap_or_else(|| "## ??".to_string());
    Ok(SqlValue::Text(replace_placeholders(&format, true, true, rng)))
}

fn regexify(_ctx: &GeneratorContext, params: &Params<'_>, rng: &mut dyn RngCore) -> Result<SqlValue> {
    let pattern = params.required_string(0, "pattern")?;
    let regex = rand_regex::Regex::compile(&pattern, 16).map_err(|err| {
        Error::config(format!("generator 'regexify': invalid pattern '{pattern}': {err}"))
    })?;
    let value: String = regex.sample(rng);
    Ok(SqlValue::Text(value))
}

/// `#` becomes a digit, `%` a non-zero digit, `?` a lowercase letter.
fn replace_placeholders(format: &str, digits: bool, letters: bool, rng: &mut dyn RngCore) -> String {
    format
        .chars()
        .map(|ch| match ch {
            '#' if digits => char::from(b'0' + rng.random_range(0..10u8)),
            '%' if digits => char::from(b'0' + rng.random_range(1..10u8)),
            '?' if letters => letter(rng),
            other => other,
        })
        .collect()
}

fn letter(rng: &mut dyn RngCore) -> char {
    char::from(b'a' + rng.random_range(0..26u8))
}

fn float_between(min: f64, max: f64, rng: &mut dyn RngCore) -> f64 {
    if min == max {
        min
    } else {
        rng.random_range(min..=max)
    }
}

fn round_to(value: f64, decimals: usize) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

fn ordered<T: PartialOrd>(a: T, b: T) -> (T, T) {
    if a <= b { (a, b) } else { (b, a) }
}
