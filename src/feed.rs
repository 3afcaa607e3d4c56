use chrono::{NaiveDateTime, TimeDelta, TimeZone};
use chrono_tz::Asia::Jerusalem;
use rss::{ChannelBuilder, Guid, ItemBuilder};

use crate::error::FeedError;
use crate::models::Movie;

pub const CHANNEL_TITLE: &str = "Cinematheque TLV";
pub const CHANNEL_DESCRIPTION: &str = "Upcoming screenings at the Tel Aviv Cinematheque";

/// Render the aggregate as an RSS 2.0 channel, one item per movie.
pub fn generate_rss(
    movies: &[Movie],
    channel_title: &str,
    channel_link: &str,
    channel_description: &str,
) -> Result<String, FeedError> {
    let items = movies
        .iter()
        .map(|movie| {
            let mut item = ItemBuilder::default();
            item.title(movie.title.clone());
            item.link(
                movie
                    .site_url
                    .clone()
                    .unwrap_or_else(|| channel_link.to_string()),
            );
            item.description(describe(movie));
            item.guid(guid_for(movie));
            if let Some(start) = movie.first_screening() {
                item.pub_date(rfc2822(start));
            }
            item.build()
        })
        .collect::<Vec<_>>();

    let channel = ChannelBuilder::default()
        .title(channel_title)
        .link(channel_link)
        .description(channel_description)
        .items(items)
        .build();

    let buf = channel.write_to(Vec::new())?;
    Ok(String::from_utf8(buf)?)
}

fn describe(movie: &Movie) -> String {
    let mut parts = Vec::new();

    if let Some(alt) = &movie.alt_name {
        parts.push(alt.clone());
    }
    if let Some(original) = &movie.original_title {
        parts.push(format!("Original title: {original}"));
    }
    if let Some(year) = movie.year {
        parts.push(format!("Year: {year}"));
    }
    if let Some(minutes) = movie.duration_minutes {
        parts.push(format!("Duration: {minutes} min"));
    }
    if !movie.screenings.is_empty() {
        let times = movie
            .screenings
            .iter()
            .map(|s| format!("{} ({})", s.date_time, s.venue))
            .collect::<Vec<_>>()
            .join(", ");
        parts.push(format!("Screenings: {times}"));
    }
    if let Some(img) = &movie.img_url {
        parts.push(format!("<img src=\"{img}\" alt=\"Poster\" />"));
    }

    if parts.is_empty() {
        format!("Film: {}", movie.title)
    } else {
        parts.join("<br/>\n")
    }
}

fn guid_for(movie: &Movie) -> Guid {
    match &movie.site_url {
        Some(url) => Guid {
            value: url.clone(),
            permalink: true,
        },
        None => Guid {
            value: movie.title.clone(),
            permalink: false,
        },
    }
}

// Screening times are wall-clock times at the venue. A time skipped by the
// spring-forward gap is read as the hour after.
fn rfc2822(start: NaiveDateTime) -> String {
    [start, start + TimeDelta::hours(1)]
        .iter()
        .find_map(|local| Jerusalem.from_local_datetime(local).earliest())
        .map(|at_venue| at_venue.to_rfc2822())
        .unwrap_or_else(|| start.and_utc().to_rfc2822())
}
