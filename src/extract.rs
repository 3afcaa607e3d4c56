//! Extraction of one date's schedule from the cinema.co.il listing markup.
//!
//! A `/shown/?date=` page mixes two layouts: grid boxes (`div.text-content`,
//! one movie each) and popup wrappers (`div.outer-wrapper`, several titles
//! sharing one time marker). Both are resolved up front into [`Container`]s.

use regex::Regex;
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::error::ExtractError;
use crate::merge::MovieMap;
use crate::models::{LEGACY_VENUE, Movie, Screening, VENUE};

fn compile(selector: &'static str) -> Result<Selector, ExtractError> {
    Selector::parse(selector).map_err(|e| ExtractError::Selector {
        selector,
        reason: format!("{e:?}"),
    })
}

fn text_of(el: ElementRef<'_>) -> String {
    el.text().collect::<String>()
}

fn is_hebrew(c: char) -> bool {
    ('\u{0590}'..='\u{05FF}').contains(&c)
}

/// "שבת 25.01.25" -> "2025-01-25". Anything else is treated as malformed.
pub fn header_date(text: &str) -> Option<String> {
    let token = text.split_whitespace().nth(1)?;
    let parts: Vec<&str> = token.split('.').collect();
    let [day, month, year] = parts[..] else {
        return None;
    };
    let numeric = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());
    if !numeric(day) || !numeric(month) || !numeric(year) || year.len() != 2 {
        return None;
    }
    Some(format!("20{year}-{month}-{day}"))
}

/// `date` query parameter of the page URL, if any.
pub fn date_from_url(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()?
        .query_pairs()
        .find(|(key, _)| key == "date")
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// English title hidden in a description such as
/// "ישראל, 2023 | Ex-Husbands הבעלים לשעבר": second `|` segment, cut at the
/// first Hebrew letter.
pub fn alt_name(description: &str) -> Option<String> {
    let segment = description.split('|').nth(1)?;
    let latin: String = segment
        .trim()
        .chars()
        .take_while(|c| !is_hebrew(*c))
        .collect();
    let latin = latin.trim();
    if latin.is_empty() {
        None
    } else {
        Some(latin.to_string())
    }
}

fn screening_at(date: &str, time: &str) -> Screening {
    let date_time = if date.is_empty() {
        time.to_string()
    } else {
        format!("{date} {time}")
    };
    Screening::new(date_time, VENUE)
}

/// Layout of one listing subtree.
#[derive(Debug, Clone, Copy)]
enum Container<'a> {
    /// `div.text-content`: a single movie with its own time markers.
    Grid(ElementRef<'a>),
    /// `div.outer-wrapper`: any number of `div.title`s sharing one `div.time`.
    Wrapper(ElementRef<'a>),
}

/// Parses schedule pages into [`Movie`] records.
///
/// Selectors are compiled once; extraction itself never fails, a missing
/// field just stays `None` and a container without a title is skipped.
pub struct ScheduleExtractor {
    main_date: Selector,
    grid: Selector,
    wrapper: Selector,
    title: Selector,
    title_link: Selector,
    any_link: Selector,
    paragraph: Selector,
    description: Selector,
    desc: Selector,
    sibling_poster: Selector,
    poster: Selector,
    grid_times: Selector,
    wrapper_time: Selector,
    heading: Selector,
    legacy_block: Selector,
    year: Regex,
}

impl ScheduleExtractor {
    pub fn new() -> Result<Self, ExtractError> {
        Ok(Self {
            main_date: compile("span.main-date")?,
            grid: compile("div.text-content")?,
            wrapper: compile("div.outer-wrapper")?,
            title: compile("div.title")?,
            title_link: compile("h3 a")?,
            any_link: compile("a")?,
            paragraph: compile("p")?,
            description: compile("div.paragraph p")?,
            desc: compile("div.desc")?,
            sibling_poster: compile("div.img-wraper img[src$=\".jpg\"]")?,
            poster: compile("img[src$=\".jpg\"]")?,
            grid_times: compile("a.cal_link span.time, span.time, div.time")?,
            wrapper_time: compile("div.time")?,
            heading: compile("h3")?,
            legacy_block: compile("div.n_block_r")?,
            year: Regex::new(r"[0-9]{4}")?,
        })
    }

    /// Parses `html` and extracts the per-date schedule.
    pub fn parse_page(&self, html: &str, page_url: Option<&str>) -> Vec<Movie> {
        let document = Html::parse_document(html);
        self.extract(&document, page_url)
    }

    /// Parses `html` as an older category page.
    pub fn parse_legacy_page(&self, html: &str) -> Vec<Movie> {
        let document = Html::parse_document(html);
        self.extract_legacy(&document)
    }

    /// Title-unique movies of one date page, in discovery order.
    pub fn extract(&self, document: &Html, page_url: Option<&str>) -> Vec<Movie> {
        let date = self.screening_date(document, page_url);
        let mut movies = MovieMap::new();

        for container in self.containers(document) {
            match container {
                Container::Grid(content) => {
                    if let Some(movie) = self.grid_movie(content, &date) {
                        movies.insert(movie);
                    }
                }
                Container::Wrapper(wrapper) => {
                    for movie in self.wrapper_movies(wrapper, &date) {
                        movies.insert(movie);
                    }
                }
            }
        }

        debug!(date = %date, movies = movies.len(), "extracted schedule page");
        movies.into_movies()
    }

    /// Older listing pages: `div.title` blocks holding an `h3` and
    /// `div.n_block_r` rows like "25-01-2025 | שבת | 11:00".
    ///
    /// Dates stay day-month-year as printed on the page.
    pub fn extract_legacy(&self, document: &Html) -> Vec<Movie> {
        let mut movies = MovieMap::new();

        for block in document.select(&self.title) {
            let title = block
                .select(&self.heading)
                .next()
                .map(|h| text_of(h).trim().to_string())
                .unwrap_or_default();
            if title.is_empty() {
                continue;
            }

            let mut movie = Movie::new(title);
            for row in block.select(&self.legacy_block) {
                let text = row
                    .select(&self.paragraph)
                    .next()
                    .map(text_of)
                    .unwrap_or_default();
                let parts: Vec<&str> = text.trim().split('|').map(str::trim).collect();
                if parts.len() < 3 {
                    continue;
                }
                movie.add_screening(Screening::new(
                    format!("{} {}", parts[0], parts[2]),
                    LEGACY_VENUE,
                ));
            }
            movies.insert(movie);
        }

        movies.into_movies()
    }

    fn containers<'a>(&self, document: &'a Html) -> Vec<Container<'a>> {
        document
            .select(&self.grid)
            .map(Container::Grid)
            .chain(document.select(&self.wrapper).map(Container::Wrapper))
            .collect()
    }

    fn screening_date(&self, document: &Html, page_url: Option<&str>) -> String {
        document
            .select(&self.main_date)
            .next()
            .and_then(|span| header_date(&text_of(span)))
            .or_else(|| page_url.and_then(date_from_url))
            .unwrap_or_default()
    }

    /// `h3 a` first, any anchor otherwise; the first one with text wins.
    fn title_link<'a>(&self, title_el: ElementRef<'a>) -> Option<(String, ElementRef<'a>)> {
        [
            title_el.select(&self.title_link).next(),
            title_el.select(&self.any_link).next(),
        ]
        .into_iter()
        .flatten()
        .find_map(|a| {
            let text = text_of(a).trim().to_string();
            if text.is_empty() { None } else { Some((text, a)) }
        })
    }

    fn year_of(&self, title_el: ElementRef<'_>) -> Option<i32> {
        let text = title_el.select(&self.paragraph).next().map(text_of)?;
        self.year.find(&text)?.as_str().parse().ok()
    }

    fn grid_movie(&self, content: ElementRef<'_>, date: &str) -> Option<Movie> {
        let title_el = content.select(&self.title).next()?;
        let (title, link) = self.title_link(title_el)?;

        let description = content
            .select(&self.description)
            .next()
            .map(text_of)
            .filter(|t| !t.trim().is_empty())
            .or_else(|| content.select(&self.desc).next().map(text_of))
            .unwrap_or_default();

        // Poster sits in a div.img-wraper next to the text box.
        let img_url = content
            .parent()
            .and_then(ElementRef::wrap)
            .and_then(|parent| parent.select(&self.sibling_poster).next())
            .or_else(|| content.select(&self.poster).next())
            .and_then(|img| img.value().attr("src"))
            .map(str::to_string);

        let mut movie = Movie::new(title);
        movie.year = self.year_of(title_el);
        movie.alt_name = alt_name(&description);
        movie.img_url = img_url;
        movie.site_url = href(link);

        for time in content.select(&self.grid_times) {
            let time = text_of(time);
            let time = time.trim();
            if !time.is_empty() {
                movie.add_screening(screening_at(date, time));
            }
        }

        Some(movie)
    }

    fn wrapper_movies(&self, wrapper: ElementRef<'_>, date: &str) -> Vec<Movie> {
        let time = wrapper
            .select(&self.wrapper_time)
            .next()
            .map(|t| text_of(t).trim().to_string())
            .filter(|t| !t.is_empty());

        wrapper
            .select(&self.title)
            .filter_map(|title_el| {
                let (title, link) = self.title_link(title_el)?;
                let description = title_el
                    .next_siblings()
                    .find_map(ElementRef::wrap)
                    .filter(|sibling| sibling.value().classes().any(|c| c == "desc"))
                    .map(text_of)
                    .unwrap_or_default();

                let mut movie = Movie::new(title);
                movie.year = self.year_of(title_el);
                movie.alt_name = alt_name(&description);
                movie.site_url = href(link);
                if let Some(time) = &time {
                    movie.add_screening(screening_at(date, time));
                }
                Some(movie)
            })
            .collect()
    }
}

fn href(link: ElementRef<'_>) -> Option<String> {
    link.value()
        .attr("href")
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    const SCHEDULE: &str = include_str!("../tests/fixtures/cinema_co_il_schedule.html");
    const LEGACY: &str = include_str!("../tests/fixtures/sample-movie-page.html");

    fn extractor() -> ScheduleExtractor {
        ScheduleExtractor::new().unwrap()
    }

    #[test]
    fn header_date_is_reversed_and_expanded() {
        assert_eq!(header_date("שבת 25.01.25").as_deref(), Some("2025-01-25"));
        assert_eq!(header_date("  שני   03.02.25 ").as_deref(), Some("2025-02-03"));
        assert_eq!(header_date("שבת"), None);
        assert_eq!(header_date("שבת 25/01/25"), None);
        assert_eq!(header_date("שבת 25.01.2025"), None);
    }

    #[test]
    fn date_comes_from_url_when_header_is_missing() {
        assert_eq!(
            date_from_url("https://www.cinema.co.il/shown/?date=2025-02-01").as_deref(),
            Some("2025-02-01")
        );
        assert_eq!(date_from_url("https://www.cinema.co.il/shown/"), None);
        assert_eq!(date_from_url("not a url"), None);
    }

    #[test]
    fn alt_name_stops_at_hebrew() {
        assert_eq!(
            alt_name("Some text | Ex-Husbands הבעלים לשעבר").as_deref(),
            Some("Ex-Husbands")
        );
        assert_eq!(alt_name("no pipe here"), None);
        assert_eq!(alt_name("ישראל | הבעלים לשעבר"), None);
        assert_eq!(alt_name("a |  | b"), None);
    }

    #[test]
    fn fixture_movie_has_full_metadata() {
        let movies = extractor().parse_page(SCHEDULE, None);
        let movie = movies
            .iter()
            .find(|m| m.title == "הבעלים לשעבר")
            .expect("movie present");

        assert_eq!(movie.year, Some(2023));
        assert_eq!(movie.alt_name.as_deref(), Some("Ex-Husbands"));
        assert_eq!(
            movie.img_url.as_deref(),
            Some("https://www.cinema.co.il/wp-content/uploads/2024/08/הבעלים-לשעבר.jpg")
        );
        assert_eq!(
            movie.site_url.as_deref(),
            Some("https://www.cinema.co.il/event/%d7%94%d7%91%d7%a2%d7%9c%d7%99%d7%9d-%d7%9c%d7%a9%d7%a2%d7%91%d7%a8/")
        );
        assert!(
            movie
                .screenings
                .iter()
                .any(|s| s.date_time == "2025-01-25 11:30" && s.venue == VENUE)
        );
    }

    #[test]
    fn fixture_alt_name_from_description() {
        let movies = extractor().parse_page(SCHEDULE, None);
        let movie = movies.iter().find(|m| m.title == "הסיפור של סולימן").unwrap();
        assert_eq!(movie.alt_name.as_deref(), Some("The Story of Souleymane"));
        // Poster directly inside the box, no sibling wrapper.
        assert_eq!(
            movie.img_url.as_deref(),
            Some("https://www.cinema.co.il/wp-content/uploads/2024/12/souleymane.jpg")
        );
    }

    #[test]
    fn fixture_titles_and_slots_are_unique() {
        let movies = extractor().parse_page(SCHEDULE, None);
        let titles: HashSet<&str> = movies.iter().map(|m| m.title.as_str()).collect();
        assert_eq!(titles.len(), movies.len());
        assert!(movies.iter().all(|m| !m.title.is_empty()));
        for movie in &movies {
            let slots: HashSet<_> = movie.screenings.iter().collect();
            assert_eq!(slots.len(), movie.screenings.len(), "{}", movie.title);
        }
    }

    #[test]
    fn grid_times_are_unioned_across_selectors() {
        let movies = extractor().parse_page(SCHEDULE, None);
        let movie = movies.iter().find(|m| m.title == "הבעלים לשעבר").unwrap();
        let times: Vec<&str> = movie.screenings.iter().map(|s| s.date_time.as_str()).collect();
        assert_eq!(times, vec!["2025-01-25 11:30", "2025-01-25 19:00"]);
    }

    #[test]
    fn wrapper_time_applies_to_every_title() {
        let movies = extractor().parse_page(SCHEDULE, None);
        for title in ["קצרים ישראליים 1", "קצרים ישראליים 2"] {
            let movie = movies.iter().find(|m| m.title == title).unwrap();
            assert_eq!(movie.screenings.len(), 1);
            assert_eq!(movie.screenings[0].date_time, "2025-01-25 20:00");
            assert_eq!(movie.img_url, None);
        }
        let first = movies.iter().find(|m| m.title == "קצרים ישראליים 1").unwrap();
        assert_eq!(first.alt_name.as_deref(), Some("Israeli Shorts 1"));
        assert_eq!(first.year, Some(2024));
    }

    #[test]
    fn title_repeated_in_wrapper_folds_into_grid_record() {
        let movies = extractor().parse_page(SCHEDULE, None);
        let movie = movies.iter().find(|m| m.title == "פטרסון").unwrap();
        assert_eq!(movie.year, Some(2016));
        let times: Vec<&str> = movie.screenings.iter().map(|s| s.date_time.as_str()).collect();
        assert_eq!(times, vec!["2025-01-25 16:00", "2025-01-25 20:00"]);
    }

    #[test]
    fn container_without_title_is_skipped() {
        let html = r#"<html><body>
            <span class="main-date">שבת 25.01.25</span>
            <div class="text-content"><div class="title"><h3></h3><p>2020</p></div>
                <span class="time">10:00</span></div>
            <div class="text-content"><span class="time">12:00</span></div>
        </body></html>"#;
        assert!(extractor().parse_page(html, None).is_empty());
    }

    #[test]
    fn plain_anchor_is_used_when_heading_link_is_missing() {
        let html = r#"<div class="text-content">
            <div class="title"><a href="/event/x/">Stalker</a><p>1979, USSR</p></div>
            <span class="time">18:00</span></div>"#;
        let movies = extractor().parse_page(html, Some("https://www.cinema.co.il/shown/?date=2025-03-01"));
        assert_eq!(movies.len(), 1);
        assert_eq!(movies[0].title, "Stalker");
        assert_eq!(movies[0].site_url.as_deref(), Some("/event/x/"));
        assert_eq!(movies[0].year, Some(1979));
        assert_eq!(movies[0].screenings[0].date_time, "2025-03-01 18:00");
    }

    #[test]
    fn year_reads_ascii_digits_only() {
        let html = r#"<div class="text-content">
            <div class="title"><h3><a href="/e/">Wadjda</a></h3><p>٢٠١٢ סעודיה, 2012</p></div>
            <span class="time">18:00</span></div>"#;
        let movies = extractor().parse_page(html, None);
        assert_eq!(movies[0].year, Some(2012));
    }

    #[test]
    fn time_only_when_no_date_is_known() {
        let html = r#"<div class="text-content">
            <div class="title"><h3><a href="/e/">Stalker</a></h3></div>
            <div class="time"> 18:00 </div></div>"#;
        let movies = extractor().parse_page(html, None);
        assert_eq!(movies[0].screenings[0].date_time, "18:00");
        assert_eq!(movies[0].year, None);
        assert_eq!(movies[0].alt_name, None);
    }

    #[test]
    fn legacy_rows_need_three_segments() {
        let document = Html::parse_document(LEGACY);
        let movies = extractor().extract_legacy(&document);

        let evan = movies.iter().find(|m| m.title == "אוון הנסן היקר").unwrap();
        let times: Vec<&str> = evan.screenings.iter().map(|s| s.date_time.as_str()).collect();
        assert_eq!(
            times,
            vec!["25-01-2025 11:00", "26-01-2025 21:15", "28-01-2025 20:00"]
        );
        assert!(evan.screenings.iter().all(|s| s.venue == LEGACY_VENUE));

        let titles: HashSet<&str> = movies.iter().map(|m| m.title.as_str()).collect();
        assert_eq!(titles.len(), movies.len());
        assert!(!titles.contains(""));
    }
}
