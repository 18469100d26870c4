//! Timeline mosaic domain library.
//! Turns a Markdown document of dated, tagged events into validated events, derives
//! per-tag columns from them, and computes the proportional vertical timeline layout.
//! Everything here is pure: text in, values out.

pub mod core {
    use serde::{Deserialize, Serialize};
    use serde_with::skip_serializing_none;
    use std::{fmt, str::FromStr, sync::Arc};
    use uuid::Uuid;

    /* ------------------------------- IDs ------------------------------- */

    /// Fresh per parse; never derived from content.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct EventId(pub Uuid);

    impl EventId {
        pub fn new() -> Self {
            Self(Uuid::new_v4())
        }
    }

    impl Default for EventId {
        fn default() -> Self {
            Self::new()
        }
    }

    impl fmt::Display for EventId {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            fmt::Display::fmt(&self.0, f)
        }
    }

    /* ------------------------------ Dates ------------------------------ */

    /// A date known to year, year+month, or full day precision.
    ///
    /// `day` is only present when `month` is; values produced by the parser are
    /// always calendar-valid.
    #[skip_serializing_none]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct PartialDate {
        pub year: u32,
        pub month: Option<u32>,
        pub day: Option<u32>,
    }

    impl PartialDate {
        pub fn year(year: u32) -> Self {
            Self {
                year,
                month: None,
                day: None,
            }
        }

        pub fn year_month(year: u32, month: u32) -> Self {
            Self {
                year,
                month: Some(month),
                day: None,
            }
        }

        pub fn ymd(year: u32, month: u32, day: u32) -> Self {
            Self {
                year,
                month: Some(month),
                day: Some(day),
            }
        }

        /// Ordering key: missing month/day count as 0, so `1945` sorts before `1945-01`.
        pub fn sort_key(&self) -> (u32, u32, u32) {
            (self.year, self.month.unwrap_or(0), self.day.unwrap_or(0))
        }
    }

    /// Gregorian leap year: divisible by 4, not by 100 unless by 400.
    pub fn is_leap_year(year: u32) -> bool {
        (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
    }

    /// Days in `month` of `year`; months outside 1..=12 have none.
    pub fn days_in_month(year: u32, month: u32) -> u32 {
        match month {
            1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
            4 | 6 | 9 | 11 => 30,
            2 if is_leap_year(year) => 29,
            2 => 28,
            _ => 0,
        }
    }

    /* ------------------------------ Events ------------------------------ */

    /// One validated event section. Immutable once built by the parser.
    #[skip_serializing_none]
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Event {
        pub id: EventId,
        pub date: PartialDate,
        pub title: String,
        /// Non-empty, unique, in source order.
        pub tags: Vec<String>,
        pub description: Option<String>,
        /// Section text exactly as it was handed to the event parser.
        pub raw: String,
    }

    impl Event {
        pub fn has_tag(&self, tag: &str) -> bool {
            self.tags.iter().any(|t| t == tag)
        }
    }

    impl AsRef<Event> for Event {
        fn as_ref(&self) -> &Event {
            self
        }
    }

    /// A section that failed to become an [`Event`].
    #[skip_serializing_none]
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ParseError {
        /// 1-based line of the section's first line in the document.
        pub line: Option<usize>,
        pub message: String,
        pub raw: String,
    }

    /// Events and errors are independent; both keep document order.
    #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ParseResult {
        pub events: Vec<Arc<Event>>,
        pub errors: Vec<ParseError>,
    }

    /// Per-tag view over shared events, filtered then sorted by date.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Column {
        pub tag: String,
        pub events: Vec<Arc<Event>>,
    }

    /* ----------------------------- Variants ----------------------------- */

    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum SortOrder {
        #[default]
        Asc,
        Desc,
    }

    impl fmt::Display for SortOrder {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(match self {
                SortOrder::Asc => "asc",
                SortOrder::Desc => "desc",
            })
        }
    }

    impl FromStr for SortOrder {
        type Err = VariantError;

        fn from_str(s: &str) -> Result<Self, Self::Err> {
            match s.trim() {
                "asc" => Ok(SortOrder::Asc),
                "desc" => Ok(SortOrder::Desc),
                other => Err(VariantError::SortOrder(other.to_string())),
            }
        }
    }

    /// Date rendering used by the view layer.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum DateFormat {
        /// `1945`, `1945-08`, `1945-08-15`
        #[default]
        Iso,
        /// `1945年`, `1945年8月`, `1945年8月15日`
        Ja,
    }

    impl fmt::Display for DateFormat {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(match self {
                DateFormat::Iso => "iso",
                DateFormat::Ja => "ja",
            })
        }
    }

    impl FromStr for DateFormat {
        type Err = VariantError;

        fn from_str(s: &str) -> Result<Self, Self::Err> {
            match s.trim() {
                "iso" => Ok(DateFormat::Iso),
                "ja" => Ok(DateFormat::Ja),
                other => Err(VariantError::DateFormat(other.to_string())),
            }
        }
    }

    /* ---------------------------- Errors (domain) ---------------------------- */

    #[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
    pub enum DateError {
        #[error("Date string is empty")]
        Empty,
        #[error("Invalid date format")]
        Format,
        #[error("Invalid year: {0}")]
        Year(String),
        #[error("Invalid month: {0} (must be 1-12)")]
        Month(String),
        #[error("Invalid day: {0} (must be 1-31)")]
        Day(String),
        #[error("Invalid day: {day} (month {month} has only {days} days)")]
        DayOutOfMonth { day: u32, month: u32, days: u32 },
    }

    #[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
    pub enum TagError {
        #[error("Tags string is empty")]
        Empty,
        #[error("Tags must start with #")]
        MissingHash,
        #[error("All tags must start with #")]
        UnprefixedToken(String),
        #[error("No valid tags found")]
        NoTags,
    }

    #[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
    pub enum EventError {
        #[error("Event text is empty")]
        Empty,
        #[error("No heading found")]
        NoHeading,
        #[error("Heading must contain both date and title")]
        IncompleteHeading,
        #[error("Invalid date: {0}")]
        Date(#[from] DateError),
        #[error("No tags found")]
        NoTags,
        #[error("Invalid tags: {0}")]
        Tags(#[from] TagError),
    }

    #[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
    pub enum VariantError {
        #[error("unknown sort order {0:?} (expected asc or desc)")]
        SortOrder(String),
        #[error("unknown date format {0:?} (expected iso or ja)")]
        DateFormat(String),
    }

}

pub mod parser {
    //! Markdown event parser built on `nom`.
    //!
    //! Document layout:
    //! - A section runs from one `##` heading line up to the next; text before the first
    //!   heading belongs to no section.
    //! - `## <date> <title words...>` opens an event, the first following `#tag #tag` line
    //!   carries its tags, and everything after that line is the description.
    //! - A section either becomes an [`Event`] or a [`ParseError`]; one bad section never
    //!   stops the rest of the document.

    use crate::core::*;
    use crate::storage::{EventSource, SourceError};
    use indexmap::IndexSet;
    use nom::{
        IResult,
        bytes::complete::tag,
        character::complete::{char, digit1},
        combinator::{all_consuming, map_res, not, rest},
        error::VerboseError,
        sequence::{preceded, terminated},
    };
    use chrono::NaiveDate;
    use std::{fs, path::Path, sync::Arc};
    use tracing::{debug, trace};

    const HEADING_MARKER: &str = "##";
    const TAG_MARKER: char = '#';
    const DESCRIPTION_SEPARATOR: &str = "---";

    /* ------------------------ Public entry points ------------------------ */

    /// Parse a whole document into events and per-section errors.
    pub fn parse_document(document: &str) -> ParseResult {
        let mut result = ParseResult::default();
        if document.trim().is_empty() {
            return result;
        }

        // (first line, byte offset) of the section being collected
        let mut open: Option<(usize, usize)> = None;
        let mut offset = 0;
        for (idx, line) in document.split_inclusive('\n').enumerate() {
            if is_section_boundary(line) {
                if let Some((first_line, start)) = open.take() {
                    finish_section(first_line, &document[start..offset], &mut result);
                }
                open = Some((idx + 1, offset));
            }
            offset += line.len();
        }
        if let Some((first_line, start)) = open {
            finish_section(first_line, &document[start..], &mut result);
        }

        debug!(
            events = result.events.len(),
            errors = result.errors.len(),
            "parsed document"
        );
        result
    }

    /// Parse one section (a heading line and what follows it) into an [`Event`].
    pub fn parse_event(text: &str) -> Result<Event, EventError> {
        if text.trim().is_empty() {
            return Err(EventError::Empty);
        }
        let lines: Vec<&str> = text.lines().collect();

        let (heading_idx, heading) = lines
            .iter()
            .enumerate()
            .find_map(|(idx, line)| heading_text(line).map(|h| (idx, h)))
            .ok_or(EventError::NoHeading)?;

        let words: Vec<&str> = heading.split_whitespace().collect();
        let [date_token, title_words @ ..] = words.as_slice() else {
            return Err(EventError::IncompleteHeading);
        };
        if title_words.is_empty() {
            return Err(EventError::IncompleteHeading);
        }
        let date = parse_date(date_token)?;
        let title = title_words.join(" ");

        let tag_idx = lines
            .iter()
            .enumerate()
            .skip(heading_idx + 1)
            .find(|(_, line)| is_tag_line(line))
            .map(|(idx, _)| idx)
            .ok_or(EventError::NoTags)?;
        let tags = parse_tags(lines[tag_idx])?;
        let description = parse_description(&lines[tag_idx + 1..]);

        Ok(Event {
            id: EventId::new(),
            date,
            title,
            tags,
            description,
            raw: text.to_string(),
        })
    }

    /// Parse `YYYY`, `YYYY-MM` or `YYYY-MM-DD` (no zero padding required).
    pub fn parse_date(input: &str) -> Result<PartialDate, DateError> {
        let token = input.trim();
        if token.is_empty() {
            return Err(DateError::Empty);
        }
        let parts: Vec<&str> = token.split('-').collect();
        let (raw_year, raw_month, raw_day) = match parts.as_slice() {
            [y] => (*y, None, None),
            [y, m] => (*y, Some(*m), None),
            [y, m, d] => (*y, Some(*m), Some(*d)),
            _ => return Err(DateError::Format),
        };

        let year = parse_number(raw_year)
            .filter(|y| *y >= 1)
            .ok_or_else(|| DateError::Year(raw_year.to_string()))?;
        let Some(raw_month) = raw_month else {
            return Ok(PartialDate::year(year));
        };

        let month = parse_number(raw_month)
            .filter(|m| (1..=12).contains(m))
            .ok_or_else(|| DateError::Month(raw_month.to_string()))?;
        let Some(raw_day) = raw_day else {
            return Ok(PartialDate::year_month(year, month));
        };

        let day = parse_number(raw_day)
            .filter(|d| (1..=31).contains(d))
            .ok_or_else(|| DateError::Day(raw_day.to_string()))?;
        // Leap years repeat every 400 years, so any year maps onto one chrono can hold.
        let calendar_year = 2000 + i32::try_from(year % 400).unwrap_or_default();
        if NaiveDate::from_ymd_opt(calendar_year, month, day).is_none() {
            return Err(DateError::DayOutOfMonth {
                day,
                month,
                days: days_in_month(year, month),
            });
        }
        Ok(PartialDate::ymd(year, month, day))
    }

    /// Parse a `#a #b` tag line into unique tag names, first occurrence wins.
    pub fn parse_tags(input: &str) -> Result<Vec<String>, TagError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(TagError::Empty);
        }
        if !trimmed.starts_with(TAG_MARKER) {
            return Err(TagError::MissingHash);
        }

        let mut tags: IndexSet<&str> = IndexSet::new();
        for token in trimmed.split_whitespace() {
            let Some(name) = token.strip_prefix(TAG_MARKER) else {
                return Err(TagError::UnprefixedToken(token.to_string()));
            };
            // A bare `#` carries no tag.
            if !name.is_empty() {
                tags.insert(name);
            }
        }

        if tags.is_empty() {
            return Err(TagError::NoTags);
        }
        Ok(tags.into_iter().map(str::to_string).collect())
    }

    /// Join description lines: trimmed, `---` lines dropped, outer blank lines removed.
    /// Interior blank lines stay so paragraphs survive. `None` when nothing is left.
    pub fn parse_description(lines: &[&str]) -> Option<String> {
        let kept: Vec<&str> = lines
            .iter()
            .map(|line| line.trim())
            .filter(|line| *line != DESCRIPTION_SEPARATOR)
            .collect();
        let start = kept.iter().position(|line| !line.is_empty())?;
        let end = kept.iter().rposition(|line| !line.is_empty())?;
        Some(kept[start..=end].join("\n"))
    }

    /// Reads a Markdown file from disk and parses it.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct MarkdownFileSource;

    impl EventSource for MarkdownFileSource {
        fn load(&self, path: &Path) -> Result<ParseResult, SourceError> {
            let text = fs::read_to_string(path).map_err(|source| SourceError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            Ok(parse_document(&text))
        }
    }

    /* ------------------------------- Utils ------------------------------- */

    type PResult<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

    /// `raw` is the exact source slice of the section, line endings included.
    fn finish_section(first_line: usize, raw: &str, result: &mut ParseResult) {
        match parse_event(raw) {
            Ok(event) => {
                trace!(line = first_line, title = %event.title, "accepted section");
                result.events.push(Arc::new(event));
            }
            Err(err) => {
                debug!(line = first_line, error = %err, "rejected section");
                result.errors.push(ParseError {
                    line: Some(first_line),
                    message: err.to_string(),
                    raw: raw.to_string(),
                });
            }
        }
    }

    fn is_section_boundary(line: &str) -> bool {
        line.trim().starts_with(HEADING_MARKER)
    }

    fn is_tag_line(line: &str) -> bool {
        let trimmed = line.trim();
        trimmed.starts_with(TAG_MARKER) && !trimmed.starts_with(HEADING_MARKER)
    }

    /// Exactly `##` (not `###`), then whatever follows.
    fn heading(i: &str) -> PResult<'_, &str> {
        preceded(terminated(tag(HEADING_MARKER), not(char(TAG_MARKER))), rest)(i)
    }

    fn heading_text(line: &str) -> Option<&str> {
        heading(line.trim()).ok().map(|(_, text)| text.trim())
    }

    fn number(i: &str) -> PResult<'_, u32> {
        map_res(digit1, |s: &str| s.parse::<u32>())(i)
    }

    /// ASCII digits only; no sign, no fraction, must fit in `u32`.
    fn parse_number(s: &str) -> Option<u32> {
        all_consuming(number)(s).ok().map(|(_, n)| n)
    }

}

pub mod views {
    //! Read-model helpers: tag vocabulary, date ordering, and per-tag columns.
    //! Nothing here mutates its input; every list returned is new.

    use crate::core::*;
    use indexmap::IndexMap;
    use std::{collections::BTreeSet, sync::Arc};

    /// All tags, most used first; ties keep the order in which tags first appeared.
    pub fn extract_all_tags<E: AsRef<Event>>(events: &[E]) -> Vec<String> {
        let mut counts: IndexMap<&str, usize> = IndexMap::new();
        for event in events {
            for tag in &event.as_ref().tags {
                *counts.entry(tag.as_str()).or_insert(0) += 1;
            }
        }
        let mut ranked: Vec<(&str, usize)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked.into_iter().map(|(tag, _)| tag.to_string()).collect()
    }

    /// Stable sort by `(year, month, day)`.
    ///
    /// `Desc` reverses the ascending result, so events with equal dates come out in
    /// reverse input order rather than input order.
    pub fn sort_events_by_date<E: AsRef<Event> + Clone>(events: &[E], order: SortOrder) -> Vec<E> {
        let mut sorted = events.to_vec();
        sorted.sort_by_key(|event| event.as_ref().date.sort_key());
        if order == SortOrder::Desc {
            sorted.reverse();
        }
        sorted
    }

    /// Events carrying exactly `tag` (case-sensitive).
    pub fn filter_events_by_tag<E: AsRef<Event> + Clone>(events: &[E], tag: &str) -> Vec<E> {
        events
            .iter()
            .filter(|event| event.as_ref().has_tag(tag))
            .cloned()
            .collect()
    }

    /// One column per selected tag, in the order given; unmatched tags give empty columns.
    pub fn create_columns<S: AsRef<str>>(
        events: &[Arc<Event>],
        selected_tags: &[S],
        order: SortOrder,
    ) -> Vec<Column> {
        selected_tags
            .iter()
            .map(|tag| {
                let tag = tag.as_ref();
                Column {
                    tag: tag.to_string(),
                    events: sort_events_by_date(&filter_events_by_tag(events, tag), order),
                }
            })
            .collect()
    }

    /// Distinct years across all columns, sorted by `order`.
    pub fn timeline_years(columns: &[Column], order: SortOrder) -> Vec<u32> {
        let years: BTreeSet<u32> = columns
            .iter()
            .flat_map(|column| column.events.iter().map(|event| event.date.year))
            .collect();
        match order {
            SortOrder::Asc => years.into_iter().collect(),
            SortOrder::Desc => years.into_iter().rev().collect(),
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        fn event(title: &str, date: PartialDate, tags: &[&str]) -> Arc<Event> {
            Arc::new(Event {
                id: EventId::new(),
                date,
                title: title.to_string(),
                tags: tags.iter().map(|t| t.to_string()).collect(),
                description: None,
                raw: String::new(),
            })
        }

        fn titles(events: &[Arc<Event>]) -> Vec<&str> {
            events.iter().map(|e| e.title.as_str()).collect()
        }

        #[test]
        fn tags_ranked_by_frequency_then_first_seen() {
            let events = vec![
                event("1", PartialDate::year(1945), &["歴史", "日本"]),
                event("2", PartialDate::year(1964), &["スポーツ", "日本"]),
                event("3", PartialDate::year(1914), &["歴史"]),
            ];
            assert_eq!(extract_all_tags(&events), vec!["歴史", "日本", "スポーツ"]);

            let events = vec![
                event("1", PartialDate::year(1), &["a", "b"]),
                event("2", PartialDate::year(2), &["a", "c"]),
            ];
            assert_eq!(extract_all_tags(&events), vec!["a", "b", "c"]);

            let events = vec![
                event("1", PartialDate::year(1), &["c", "b"]),
                event("2", PartialDate::year(2), &["b", "a"]),
                event("3", PartialDate::year(3), &["a"]),
            ];
            assert_eq!(extract_all_tags(&events), vec!["b", "a", "c"]);
        }

        #[test]
        fn tags_of_nothing() {
            let events: Vec<Arc<Event>> = Vec::new();
            assert!(extract_all_tags(&events).is_empty());
        }

        #[test]
        fn sort_by_partial_dates() {
            let events = vec![
                event("d", PartialDate::ymd(1945, 8, 15), &["x"]),
                event("a", PartialDate::year(1914), &["x"]),
                event("c", PartialDate::year_month(1945, 8), &["x"]),
                event("b", PartialDate::year(1945), &["x"]),
            ];
            let asc = sort_events_by_date(&events, SortOrder::Asc);
            assert_eq!(titles(&asc), vec!["a", "b", "c", "d"]);
            let desc = sort_events_by_date(&events, SortOrder::Desc);
            assert_eq!(titles(&desc), vec!["d", "c", "b", "a"]);
            // input untouched
            assert_eq!(titles(&events), vec!["d", "a", "c", "b"]);
        }

        #[test]
        fn sort_ties_are_stable_ascending_and_reversed_descending() {
            let events = vec![
                event("first", PartialDate::year(1945), &["x"]),
                event("second", PartialDate::year(1945), &["x"]),
                event("early", PartialDate::year(1900), &["x"]),
            ];
            let asc = sort_events_by_date(&events, SortOrder::Asc);
            assert_eq!(titles(&asc), vec!["early", "first", "second"]);
            let desc = sort_events_by_date(&events, SortOrder::Desc);
            assert_eq!(titles(&desc), vec!["second", "first", "early"]);

            let again = sort_events_by_date(&asc, SortOrder::Asc);
            assert_eq!(titles(&again), titles(&asc));

            // desc of desc differs from the input when there are ties
            let twice = sort_events_by_date(&desc, SortOrder::Desc);
            assert_eq!(titles(&twice), vec!["first", "second", "early"]);
        }

        #[test]
        fn sort_works_on_borrowed_events() {
            let owned = [
                Event::clone(&event("b", PartialDate::year(2000), &["x"])),
                Event::clone(&event("a", PartialDate::year(1000), &["x"])),
            ];
            let borrowed: Vec<&Event> = owned.iter().collect();
            let sorted = sort_events_by_date(&borrowed, SortOrder::Asc);
            assert_eq!(sorted[0].title, "a");
        }

        #[test]
        fn filter_is_exact_and_case_sensitive() {
            let events = vec![
                event("1", PartialDate::year(1), &["Rust"]),
                event("2", PartialDate::year(2), &["rust"]),
                event("3", PartialDate::year(3), &["rustacean"]),
            ];
            assert_eq!(titles(&filter_events_by_tag(&events, "rust")), vec!["2"]);
            assert!(filter_events_by_tag(&events, "").is_empty());

            let with_empty = vec![event("e", PartialDate::year(1), &[""])];
            assert_eq!(filter_events_by_tag(&with_empty, "").len(), 1);
        }

        #[test]
        fn columns_follow_selection_order_and_share_events() {
            let shared = event("終戦", PartialDate::ymd(1945, 8, 15), &["歴史", "日本"]);
            let events = vec![
                event("五輪", PartialDate::year(1964), &["日本"]),
                shared.clone(),
                event("大戦", PartialDate::year(1914), &["歴史"]),
            ];
            let snapshot = events.clone();

            let columns = create_columns(&events, &["歴史", "日本", "未使用", "歴史"], SortOrder::Asc);
            assert_eq!(columns.len(), 4);
            assert_eq!(columns[0].tag, "歴史");
            assert_eq!(titles(&columns[0].events), vec!["大戦", "終戦"]);
            assert_eq!(titles(&columns[1].events), vec!["終戦", "五輪"]);
            assert!(columns[2].events.is_empty());
            assert_eq!(columns[3], columns[0]);

            assert!(Arc::ptr_eq(&columns[0].events[1], &shared));
            assert!(Arc::ptr_eq(&columns[1].events[0], &shared));
            assert_eq!(events, snapshot);
        }

        #[test]
        fn no_selection_no_columns() {
            let events = vec![event("1", PartialDate::year(1), &["a"])];
            let none: [&str; 0] = [];
            assert!(create_columns(&events, &none, SortOrder::Asc).is_empty());
        }

        #[test]
        fn timeline_years_are_distinct_and_ordered() {
            let events = vec![
                event("1", PartialDate::year(1990), &["a", "b"]),
                event("2", PartialDate::year_month(1965, 3), &["a"]),
                event("3", PartialDate::year(1984), &["b"]),
                event("4", PartialDate::ymd(1965, 1, 1), &["b"]),
            ];
            let columns = create_columns(&events, &["a", "b"], SortOrder::Asc);
            assert_eq!(timeline_years(&columns, SortOrder::Asc), vec![1965, 1984, 1990]);
            assert_eq!(timeline_years(&columns, SortOrder::Desc), vec![1990, 1984, 1965]);
            assert!(timeline_years(&[], SortOrder::Asc).is_empty());
        }
    }
}

pub mod layout {
    //! Proportional vertical layout for the timeline column.
    //!
    //! Spacing between consecutive years grows linearly with elapsed time but never drops
    //! below a floor. Century markers are placed by interpolating between known years, or
    //! extrapolating past either end at the linear rate.

    use crate::core::{Column, SortOrder};
    use crate::views::timeline_years;
    use indexmap::IndexMap;
    use serde::{Deserialize, Serialize};

    pub const DEFAULT_PIXELS_PER_YEAR: f64 = 10.0;
    pub const DEFAULT_MIN_YEAR_SPACING: f64 = 80.0;
    pub const DEFAULT_HEADER_HEIGHT: f64 = 60.0;

    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    #[serde(default, rename_all = "camelCase")]
    pub struct LayoutConfig {
        pub pixels_per_year: f64,
        pub min_year_spacing: f64,
        pub header_height: f64,
    }

    impl Default for LayoutConfig {
        fn default() -> Self {
            Self {
                pixels_per_year: DEFAULT_PIXELS_PER_YEAR,
                min_year_spacing: DEFAULT_MIN_YEAR_SPACING,
                header_height: DEFAULT_HEADER_HEIGHT,
            }
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct CenturyMarker {
        /// Wider than event years: the last century boundary can exceed `u32::MAX`.
        pub year: u64,
        pub position: f64,
    }

    /// Everything the view layer needs to draw the timeline column.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Timeline {
        pub years: Vec<u32>,
        pub positions: Vec<f64>,
        pub century_markers: Vec<CenturyMarker>,
    }

    #[derive(Debug, Clone, Copy, Default, PartialEq)]
    pub struct TimelineLayout {
        config: LayoutConfig,
    }

    impl TimelineLayout {
        pub fn new(config: LayoutConfig) -> Self {
            Self { config }
        }

        pub fn config(&self) -> &LayoutConfig {
            &self.config
        }

        /// Top offset of each year, in the order given.
        pub fn year_positions(&self, years: &[u32]) -> Vec<f64> {
            if years.is_empty() {
                return Vec::new();
            }
            let start = self.config.header_height + self.config.min_year_spacing / 2.0;
            std::iter::once(start)
                .chain(years.windows(2).scan(start, |top, pair| {
                    *top += self.spacing(pair[0], pair[1]);
                    Some(*top)
                }))
                .collect()
        }

        /// Markers for every multiple of 100 from `floor(min)` to `ceil(max)`.
        pub fn century_markers(
            &self,
            years: &[u32],
            positions: &IndexMap<u32, f64>,
        ) -> Vec<CenturyMarker> {
            let (Some(&min), Some(&max)) = (years.iter().min(), years.iter().max()) else {
                return Vec::new();
            };
            let mut known: Vec<(u64, f64)> = years
                .iter()
                .filter_map(|year| positions.get(year).map(|pos| (u64::from(*year), *pos)))
                .collect();
            known.sort_by_key(|(year, _)| *year);
            known.dedup_by_key(|(year, _)| *year);
            let (Some(&(_, first_pos)), Some(&(_, last_pos))) = (known.first(), known.last())
            else {
                return Vec::new();
            };
            // Descending layouts put later years higher up.
            let direction = if last_pos < first_pos { -1.0 } else { 1.0 };

            let start = u64::from(min) / 100 * 100;
            let end = u64::from(max).div_ceil(100) * 100;
            (start..=end)
                .step_by(100)
                .map(|year| CenturyMarker {
                    year,
                    position: self.century_position(year, &known, direction),
                })
                .collect()
        }

        /// Years, positions and century markers for the years present in `columns`.
        pub fn layout(&self, columns: &[Column], order: SortOrder) -> Timeline {
            let years = timeline_years(columns, order);
            let positions = self.year_positions(&years);
            let map = year_position_map(&years, &positions);
            let century_markers = self.century_markers(&years, &map);
            Timeline {
                years,
                positions,
                century_markers,
            }
        }

        fn spacing(&self, from: u32, to: u32) -> f64 {
            let linear = f64::from(from.abs_diff(to)) * self.config.pixels_per_year;
            linear.max(self.config.min_year_spacing)
        }

        /// `known` is sorted by year, non-empty, without duplicates.
        fn century_position(&self, year: u64, known: &[(u64, f64)], direction: f64) -> f64 {
            let rate = self.config.pixels_per_year * direction;
            match known.binary_search_by_key(&year, |(y, _)| *y) {
                Ok(idx) => known[idx].1,
                Err(0) => {
                    let (first_year, first_pos) = known[0];
                    first_pos - (first_year - year) as f64 * rate
                }
                Err(idx) if idx == known.len() => {
                    let (last_year, last_pos) = known[idx - 1];
                    last_pos + (year - last_year) as f64 * rate
                }
                Err(idx) => {
                    let (y0, p0) = known[idx - 1];
                    let (y1, p1) = known[idx];
                    let fraction = (year - y0) as f64 / (y1 - y0) as f64;
                    p0 + fraction * (p1 - p0)
                }
            }
        }
    }

    /// Pair each year with its position, keeping the given order.
    pub fn year_position_map(years: &[u32], positions: &[f64]) -> IndexMap<u32, f64> {
        years.iter().copied().zip(positions.iter().copied()).collect()
    }

}

pub mod format {
    //! Text renderings of dates and events for the view layer.

    use crate::core::{DateFormat, Event, PartialDate};
    use std::fmt;

    pub fn format_date(date: &PartialDate, format: DateFormat) -> String {
        match (format, date.month, date.day) {
            (DateFormat::Iso, Some(m), Some(d)) => format!("{}-{:02}-{:02}", date.year, m, d),
            (DateFormat::Iso, Some(m), None) => format!("{}-{:02}", date.year, m),
            (DateFormat::Iso, None, _) => date.year.to_string(),
            (DateFormat::Ja, Some(m), Some(d)) => format!("{}年{}月{}日", date.year, m, d),
            (DateFormat::Ja, Some(m), None) => format!("{}年{}月", date.year, m),
            (DateFormat::Ja, None, _) => format!("{}年", date.year),
        }
    }

    impl fmt::Display for PartialDate {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(&format_date(self, DateFormat::Iso))
        }
    }

    /// One-line summary: `<date> <title> #tag #tag`.
    pub fn format_event_line(event: &Event, format: DateFormat) -> String {
        let mut line = format!("{} {}", format_date(&event.date, format), event.title);
        for tag in &event.tags {
            line.push_str(" #");
            line.push_str(tag);
        }
        line
    }

}

pub mod storage {
    use super::core::ParseResult;
    use std::path::{Path, PathBuf};

    /// Failure to obtain the document at all; fatal for the whole request, unlike
    /// per-section parse errors.
    #[derive(Debug, thiserror::Error)]
    pub enum SourceError {
        #[error("Failed to read file: {}: {}", .path.display(), .source)]
        Read {
            path: PathBuf,
            #[source]
            source: std::io::Error,
        },
    }

    /// Where documents come from is separate from how they are parsed.
    pub trait EventSource {
        fn load(&self, path: &Path) -> Result<ParseResult, SourceError>;
    }
}

pub mod api {
    //! Boundary functions consumed by serving code: each takes a complete document and
    //! returns a complete, serializable response.

    use crate::core::*;
    use crate::parser::parse_document;
    use crate::views::{create_columns, extract_all_tags};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct TagsResponse {
        pub tags: Vec<String>,
        /// Always `tags.len()`.
        pub count: usize,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ColumnsMetadata {
        pub selected_tags: Vec<String>,
        pub sort_order: SortOrder,
        /// Parsed event count, not the sum of column sizes.
        pub total_events: usize,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ColumnsResponse {
        pub columns: Vec<Column>,
        pub metadata: ColumnsMetadata,
    }

    pub fn parse(document: &str) -> ParseResult {
        parse_document(document)
    }

    pub fn tags(document: &str) -> TagsResponse {
        tags_for(&parse_document(document))
    }

    pub fn columns<S: AsRef<str>>(
        document: &str,
        selected_tags: &[S],
        order: SortOrder,
    ) -> ColumnsResponse {
        columns_for(&parse_document(document), selected_tags, order)
    }

    /// [`tags`] over an already parsed document.
    pub fn tags_for(result: &ParseResult) -> TagsResponse {
        let tags = extract_all_tags(&result.events);
        TagsResponse {
            count: tags.len(),
            tags,
        }
    }

    /// [`columns`] over an already parsed document.
    pub fn columns_for<S: AsRef<str>>(
        result: &ParseResult,
        selected_tags: &[S],
        order: SortOrder,
    ) -> ColumnsResponse {
        ColumnsResponse {
            columns: create_columns(&result.events, selected_tags, order),
            metadata: ColumnsMetadata {
                selected_tags: selected_tags
                    .iter()
                    .map(|t| t.as_ref().to_string())
                    .collect(),
                sort_order: order,
                total_events: result.events.len(),
            },
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use std::sync::Arc;

        const DOC: &str = r#"## 1945-08-15 終戦記念日
#歴史 #日本

第二次世界大戦の終結。

## 1964-10-10 東京オリンピック開幕
#スポーツ #日本

## 1914-07-28 第一次世界大戦勃発
#歴史 #戦争
"#;

        #[test]
        fn parse_returns_events_in_document_order() {
            let result = parse(DOC);
            let titles: Vec<&str> = result.events.iter().map(|e| e.title.as_str()).collect();
            assert_eq!(
                titles,
                vec!["終戦記念日", "東京オリンピック開幕", "第一次世界大戦勃発"]
            );
            assert!(result.errors.is_empty());
        }

        #[test]
        fn tags_count_matches_list() {
            let response = tags(DOC);
            assert_eq!(response.tags, vec!["歴史", "日本", "スポーツ", "戦争"]);
            assert_eq!(response.count, response.tags.len());
            assert_eq!(tags(""), TagsResponse { tags: vec![], count: 0 });
        }

        #[test]
        fn shared_event_appears_in_both_columns() {
            let response = columns(DOC, &["歴史", "日本"], SortOrder::Asc);
            assert_eq!(response.columns.len(), 2);

            let history = &response.columns[0];
            let japan = &response.columns[1];
            assert_eq!(history.tag, "歴史");
            assert_eq!(history.events[1].title, "終戦記念日");
            assert_eq!(japan.events[0].title, "終戦記念日");
            assert_eq!(history.events[1].id, japan.events[0].id);
            assert!(Arc::ptr_eq(&history.events[1], &japan.events[0]));

            assert_eq!(response.metadata.total_events, 3);
            assert_eq!(response.metadata.selected_tags, vec!["歴史", "日本"]);
        }

        #[test]
        fn columns_descending() {
            let response = columns(DOC, &["歴史"], SortOrder::Desc);
            let titles: Vec<&str> = response.columns[0]
                .events
                .iter()
                .map(|e| e.title.as_str())
                .collect();
            assert_eq!(titles, vec!["終戦記念日", "第一次世界大戦勃発"]);
        }

        #[test]
        fn columns_json_shape() {
            let response = columns(DOC, &["戦争"], SortOrder::Desc);
            let json = serde_json::to_value(&response).unwrap();
            assert_eq!(json["metadata"]["selectedTags"][0], "戦争");
            assert_eq!(json["metadata"]["sortOrder"], "desc");
            assert_eq!(json["metadata"]["totalEvents"], 3);
            let event = &json["columns"][0]["events"][0];
            assert_eq!(event["date"]["year"], 1914);
            assert!(event.get("description").is_none());
        }

        #[test]
        fn mixed_document_keeps_going_after_errors() {
            let doc = "## 1945 A\n#x\n\n## abc B\n#x\n\n## 1946 C\n#x\n";
            let result = parse(doc);
            assert_eq!(result.events.len(), 2);
            assert_eq!(result.errors.len(), 1);
            assert!(result.errors[0].message.contains("Invalid date"));
            let response = columns(doc, &["x"], SortOrder::Asc);
            assert_eq!(response.metadata.total_events, 2);
        }
    }
}

pub use layout::{LayoutConfig, TimelineLayout};
pub use parser::{MarkdownFileSource, parse_document};
