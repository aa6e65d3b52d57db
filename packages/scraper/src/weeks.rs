//! Resolution of the per-week report identifier.
//!
//! The remote application addresses a week's report by an opaque number
//! that is only visible on the report overview page, inside the `onclick`
//! handler of the week's tile. It is looked up on every call because the
//! overview grows as the training year progresses.

use std::sync::LazyLock;

use azubiheft_scraper_models::WeekId;
use chrono::{Datelike as _, NaiveDate};
use regex::Regex;
use scraper::Html;

use crate::{AzubiheftError, Session, html};

/// Report overview page listing one tile per reportable week.
pub(crate) const OVERVIEW_PATH: &str = "/Azubi/Ausbildungsnachweise.aspx";

static WEEK_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"NachweisNr=(\d+)").unwrap_or_else(|_| unreachable!()));

/// One week tile of the overview page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeekTile {
    /// Calendar week number.
    pub week: u32,
    /// Four-digit year.
    pub year: i32,
    /// Raw `onclick` handler carrying the report identifier.
    pub onclick: String,
}

impl WeekTile {
    /// Extracts the report identifier from the tile's `onclick` handler.
    #[must_use]
    pub fn week_id(&self) -> Option<WeekId> {
        WEEK_ID_RE
            .captures(&self.onclick)
            .and_then(|caps| caps.get(1))
            .map(|m| WeekId::new(m.as_str()))
    }
}

/// Parses all well-formed week tiles of the overview page, in document
/// order.
///
/// A tile needs an `onclick` attribute, a numeric `div.sKW` and a `div.KW`
/// whose third nested `div` holds the year. Tiles missing any of these are
/// skipped.
///
/// # Errors
///
/// Returns [`AzubiheftError::Parse`] if the selectors cannot be built.
pub fn parse_week_tiles(body: &str) -> Result<Vec<WeekTile>, AzubiheftError> {
    const STEP: &str = "parsing report overview";

    let document = Html::parse_document(body);
    let tile_sel = html::selector("div.mo.NBox", STEP)?;
    let week_sel = html::selector("div.sKW", STEP)?;
    let kw_sel = html::selector("div.KW", STEP)?;
    let div_sel = html::selector("div", STEP)?;

    let tiles = document
        .select(&tile_sel)
        .filter_map(|tile| {
            let onclick = tile.value().attr("onclick")?;
            let week = html::child_text(tile, &week_sel)?.parse::<u32>().ok()?;
            let kw = tile.select(&kw_sel).next()?;
            let year = kw
                .select(&div_sel)
                .nth(2)
                .map(html::trimmed_text)?
                .parse::<i32>()
                .ok()?;

            Some(WeekTile {
                week,
                year,
                onclick: onclick.to_owned(),
            })
        })
        .collect();

    Ok(tiles)
}

/// Finds the report identifier of the ISO week containing `date`.
///
/// # Errors
///
/// Returns [`AzubiheftError::NotFound`] if no tile matches and
/// [`AzubiheftError::Parse`] if the matching tile carries no identifier.
pub fn find_week_id(body: &str, date: NaiveDate) -> Result<WeekId, AzubiheftError> {
    let iso = date.iso_week();
    let (year, week) = (iso.year(), iso.week());

    let tile = parse_week_tiles(body)?
        .into_iter()
        .find(|tile| tile.week == week && tile.year == year)
        .ok_or_else(|| AzubiheftError::NotFound {
            message: format!("no report found for week {week}/{year}"),
        })?;

    tile.week_id().ok_or_else(|| {
        AzubiheftError::parse(
            "parsing report overview",
            format!("tile for week {week}/{year} has no NachweisNr in its onclick handler"),
        )
    })
}

impl Session {
    /// Looks up the report identifier of the week containing `date`.
    ///
    /// # Errors
    ///
    /// Returns [`AzubiheftError::NotFound`] if the overview lists no such
    /// week, [`AzubiheftError::RemoteRequest`] if the overview answers with a
    /// non-success status and [`AzubiheftError::Transport`] if the request
    /// fails.
    pub async fn report_week_id(&self, date: NaiveDate) -> Result<WeekId, AzubiheftError> {
        let page = self
            .fetch_page(OVERVIEW_PATH, "fetching report overview")
            .await?;
        let week_id = find_week_id(&page.body, date)?;
        log::debug!("Week of {date} has report id {week_id}");
        Ok(week_id)
    }
}
