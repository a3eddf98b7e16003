// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Ticket redirection: find the printers of a group that can fulfil a job.
//
// Capabilities come from IPP printer attributes.  Unlike settings
// validation, redirection is strict: a capability the printer does not
// advertise counts as missing and excludes it.

use std::collections::{BTreeMap, HashMap, HashSet};

use pagetally_core::types::{DuplexMode, OutboxJob, Ticket};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const COLLATED_COPIES: &str = "separate-documents-collated-copies";

/// A paper source (tray) and the media loaded in it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaSource {
    /// IPP `media-source` keyword, e.g. "tray-1".
    pub source: String,
    /// IPP media keyword loaded in the source, e.g. "iso_a4_210x297mm".
    pub media: String,
}

/// What a printer can do.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrinterCapabilities {
    /// Supported sides keywords (e.g. "one-sided", "two-sided-long-edge").
    pub sides_supported: HashSet<String>,
    pub color_supported: bool,
    pub collate_supported: bool,
    pub media_sources: Vec<MediaSource>,
    pub output_bins: Vec<String>,
    /// Offered choices per IPP option keyword (e.g. "finishings").
    pub options: BTreeMap<String, HashSet<String>>,
}

impl PrinterCapabilities {
    /// Parse capabilities from raw IPP printer attributes.
    pub fn from_attributes(attrs: &HashMap<String, String>) -> Self {
        let color_supported = attrs
            .get("color-supported")
            .is_some_and(|v| v.eq_ignore_ascii_case("true") || v == "1");
        let collate_supported =
            parse_set(attrs.get("multiple-document-handling-supported")).contains(COLLATED_COPIES);

        let options = ["finishings-supported", "print-quality-supported", "punching-supported"]
            .iter()
            .filter_map(|attr| {
                let choices = parse_set(attrs.get(*attr));
                (!choices.is_empty())
                    .then(|| (attr.trim_end_matches("-supported").to_string(), choices))
            })
            .collect();

        Self {
            sides_supported: parse_set(attrs.get("sides-supported")),
            color_supported,
            collate_supported,
            media_sources: Vec::new(),
            output_bins: parse_list(attrs.get("output-bin-supported")),
            options,
        }
    }

    pub fn with_media_source(mut self, source: impl Into<String>, media: impl Into<String>) -> Self {
        self.media_sources.push(MediaSource {
            source: source.into(),
            media: media.into(),
        });
        self
    }

    /// Whether the printer advertises the IPP `sides` keyword of `sides`.
    /// One-sided printing needs no advertisement.
    pub fn supports_sides(&self, sides: DuplexMode) -> bool {
        !sides.is_duplex() || self.sides_supported.contains(sides.ipp_sides_keyword())
    }

    fn source_for(&self, media: &str) -> Option<&MediaSource> {
        self.media_sources
            .iter()
            .find(|s| !s.media.is_empty() && s.media == media)
    }
}

/// A member of a printer group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedirectPrinter {
    pub name: String,
    pub disabled: bool,
    pub deleted: bool,
    pub capabilities: PrinterCapabilities,
}

impl RedirectPrinter {
    pub fn new(name: impl Into<String>, capabilities: PrinterCapabilities) -> Self {
        Self {
            name: name.into(),
            disabled: false,
            deleted: false,
            capabilities,
        }
    }
}

/// What a job requires of the printer that fulfils it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RedirectRequest {
    pub sides: DuplexMode,
    pub color: bool,
    pub media: Option<String>,
    pub job_sheet_media: Option<String>,
    pub output_bin: Option<String>,
    pub options: BTreeMap<String, String>,
    pub copies: u32,
    pub pages: u32,
}

impl From<&OutboxJob> for RedirectRequest {
    fn from(job: &OutboxJob) -> Self {
        Self {
            sides: job.options.duplex,
            color: job.options.color,
            media: job.options.media.clone(),
            job_sheet_media: job.options.job_sheet_media.clone(),
            output_bin: job.options.output_bin.clone(),
            options: job.options.ipp_options.clone(),
            copies: job.copies,
            pages: job.pages,
        }
    }
}

impl From<&Ticket> for RedirectRequest {
    fn from(ticket: &Ticket) -> Self {
        Self::from(&ticket.job)
    }
}

/// A printer able to fulfil the job, with the settings to use on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectCandidate {
    pub printer_name: String,
    /// Source holding the requested media.
    pub media_source: Option<String>,
    /// Source holding the requested job-sheet media.
    pub job_sheet_media_source: Option<String>,
    pub output_bin: Option<String>,
    /// Advisory: suggested first choice in the operator's list.
    pub preferred: bool,
}

/// Surviving candidates in group order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectSelection {
    pub candidates: Vec<RedirectCandidate>,
    pub preferred: Option<usize>,
}

/// Filters a printer group down to the members that can print a job.
#[derive(Debug, Default, Clone, Copy)]
pub struct RedirectMatcher;

impl RedirectMatcher {
    pub fn new() -> Self {
        Self
    }

    /// Candidates of `group` able to fulfil `request`.
    ///
    /// The first candidate whose colour capability equals the job's colour
    /// requirement is marked preferred.
    pub fn select_candidates(
        &self,
        request: &RedirectRequest,
        group: &[RedirectPrinter],
    ) -> RedirectSelection {
        let (mut candidates, colors): (Vec<RedirectCandidate>, Vec<bool>) = group
            .iter()
            .filter_map(|printer| {
                candidate_for(request, printer).map(|c| (c, printer.capabilities.color_supported))
            })
            .unzip();

        let preferred = colors.iter().position(|color| *color == request.color);
        if let Some(candidate) = preferred.and_then(|index| candidates.get_mut(index)) {
            candidate.preferred = true;
        }

        debug!(
            group = group.len(),
            candidates = candidates.len(),
            ?preferred,
            "redirect candidates selected"
        );
        RedirectSelection {
            candidates,
            preferred,
        }
    }

    /// Pick a candidate uniformly at random.
    pub fn choose_printer<'a>(&self, selection: &'a RedirectSelection) -> Option<&'a RedirectCandidate> {
        let chosen = selection.candidates.choose(&mut rand::thread_rng());
        if let Some(candidate) = chosen {
            info!(printer = %candidate.printer_name, "redirect printer chosen");
        }
        chosen
    }
}

fn candidate_for(request: &RedirectRequest, printer: &RedirectPrinter) -> Option<RedirectCandidate> {
    let caps = &printer.capabilities;
    if printer.disabled || printer.deleted {
        return None;
    }
    if !caps.supports_sides(request.sides) {
        return None;
    }
    if request.color && !caps.color_supported {
        return None;
    }
    let options_offered = request.options.iter().all(|(keyword, choice)| {
        caps.options
            .get(keyword)
            .is_some_and(|offered| offered.contains(choice))
    });
    if !options_offered {
        return None;
    }
    let media_source = match &request.media {
        Some(media) => Some(caps.source_for(media)?.source.clone()),
        None => None,
    };
    if request.copies > 1 && request.pages > 1 && !caps.collate_supported {
        return None;
    }

    let job_sheet_media_source = request
        .job_sheet_media
        .as_deref()
        .and_then(|media| caps.source_for(media))
        .map(|s| s.source.clone());
    let output_bin = match &request.output_bin {
        Some(bin) if caps.output_bins.contains(bin) => Some(bin.clone()),
        _ => caps.output_bins.first().cloned(),
    };

    Some(RedirectCandidate {
        printer_name: printer.name.clone(),
        media_source,
        job_sheet_media_source,
        output_bin,
        preferred: false,
    })
}

/// Parse a comma-separated or multi-valued IPP attribute into a HashSet.
fn parse_set(value: Option<&String>) -> HashSet<String> {
    parse_list(value).into_iter().collect()
}

fn parse_list(value: Option<&String>) -> Vec<String> {
    match value {
        Some(v) => v
            .split([',', ';'])
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        None => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A4: &str = "iso_a4_210x297mm";
    const A3: &str = "iso_a3_297x420mm";

    fn caps(attrs: &[(&str, &str)]) -> PrinterCapabilities {
        let attrs: HashMap<String, String> = attrs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        PrinterCapabilities::from_attributes(&attrs)
    }

    fn duplex_color(name: &str) -> RedirectPrinter {
        RedirectPrinter::new(
            name,
            caps(&[
                ("sides-supported", "one-sided, two-sided-long-edge"),
                ("color-supported", "true"),
                ("multiple-document-handling-supported", COLLATED_COPIES),
                ("finishings-supported", "none, staple"),
                ("output-bin-supported", "face-down, stacker-1"),
            ])
            .with_media_source("tray-1", A4)
            .with_media_source("tray-2", A3),
        )
    }

    fn simplex_mono(name: &str) -> RedirectPrinter {
        RedirectPrinter::new(
            name,
            caps(&[("sides-supported", "one-sided"), ("color-supported", "false")])
                .with_media_source("main", A4),
        )
    }

    fn request() -> RedirectRequest {
        RedirectRequest {
            copies: 1,
            pages: 1,
            ..RedirectRequest::default()
        }
    }

    #[test]
    fn duplex_color_job_selects_only_the_capable_printer() {
        let group = [duplex_color("laser-1"), simplex_mono("mono-1")];
        let mut req = request();
        req.sides = DuplexMode::LongEdge;
        req.color = true;

        let selection = RedirectMatcher::new().select_candidates(&req, &group);
        assert_eq!(selection.candidates.len(), 1);
        assert_eq!(selection.candidates[0].printer_name, "laser-1");
        assert!(selection.candidates[0].preferred);
        assert_eq!(selection.preferred, Some(0));
    }

    #[test]
    fn duplex_edge_must_be_advertised() {
        let group = [duplex_color("laser-1")];
        let mut req = request();
        req.sides = DuplexMode::ShortEdge;
        assert!(RedirectMatcher::new().select_candidates(&req, &group).candidates.is_empty());
    }

    #[test]
    fn duplicate_printer_names_mark_the_surviving_member() {
        let mut off = duplex_color("hall");
        off.disabled = true;
        let group = [off, simplex_mono("hall")];

        let selection = RedirectMatcher::new().select_candidates(&request(), &group);
        assert_eq!(selection.candidates.len(), 1);
        assert_eq!(selection.preferred, Some(0));
        assert!(selection.candidates[0].preferred);
    }

    #[test]
    fn mono_job_prefers_the_first_mono_printer() {
        let group = [duplex_color("laser-1"), simplex_mono("mono-1")];
        let selection = RedirectMatcher::new().select_candidates(&request(), &group);
        assert_eq!(selection.candidates.len(), 2);
        assert_eq!(selection.preferred, Some(1));
        assert!(!selection.candidates[0].preferred);
        assert!(selection.candidates[1].preferred);
    }

    #[test]
    fn disabled_and_deleted_printers_are_skipped() {
        let mut off = duplex_color("off");
        off.disabled = true;
        let mut gone = duplex_color("gone");
        gone.deleted = true;
        let selection = RedirectMatcher::new().select_candidates(&request(), &[off, gone]);
        assert!(selection.candidates.is_empty());
        assert_eq!(selection.preferred, None);
    }

    #[test]
    fn unoffered_option_excludes_printer() {
        let group = [duplex_color("laser-1"), simplex_mono("mono-1")];
        let mut req = request();
        req.options.insert("finishings".into(), "staple".into());
        let selection = RedirectMatcher::new().select_candidates(&req, &group);
        assert_eq!(selection.candidates.len(), 1);
        assert_eq!(selection.candidates[0].printer_name, "laser-1");

        req.options.insert("finishings".into(), "punch".into());
        assert!(RedirectMatcher::new().select_candidates(&req, &group).candidates.is_empty());
    }

    #[test]
    fn requested_media_picks_the_matching_source() {
        let group = [duplex_color("laser-1"), simplex_mono("mono-1")];
        let mut req = request();
        req.media = Some(A3.into());
        req.job_sheet_media = Some(A4.into());
        req.output_bin = Some("stacker-1".into());

        let selection = RedirectMatcher::new().select_candidates(&req, &group);
        assert_eq!(selection.candidates.len(), 1);
        let candidate = &selection.candidates[0];
        assert_eq!(candidate.media_source.as_deref(), Some("tray-2"));
        assert_eq!(candidate.job_sheet_media_source.as_deref(), Some("tray-1"));
        assert_eq!(candidate.output_bin.as_deref(), Some("stacker-1"));
    }

    #[test]
    fn multi_copy_jobs_need_collation() {
        let group = [duplex_color("laser-1"), simplex_mono("mono-1")];
        let mut req = request();
        req.copies = 3;
        req.pages = 5;
        let selection = RedirectMatcher::new().select_candidates(&req, &group);
        assert_eq!(selection.candidates.len(), 1);

        req.pages = 1;
        assert_eq!(RedirectMatcher::new().select_candidates(&req, &group).candidates.len(), 2);
    }

    #[test]
    fn choose_printer_returns_a_survivor() {
        let group = [duplex_color("a"), duplex_color("b"), simplex_mono("c")];
        let mut req = request();
        req.color = true;
        let matcher = RedirectMatcher::new();
        let selection = matcher.select_candidates(&req, &group);
        for _ in 0..20 {
            let chosen = matcher.choose_printer(&selection).unwrap();
            assert!(chosen.printer_name == "a" || chosen.printer_name == "b");
        }
        assert!(matcher.choose_printer(&RedirectSelection::default()).is_none());
    }

    #[test]
    fn attributes_parse_into_capabilities() {
        let printer = duplex_color("laser-1");
        let caps = &printer.capabilities;
        assert!(caps.supports_sides(DuplexMode::LongEdge));
        assert!(!caps.supports_sides(DuplexMode::ShortEdge));
        assert!(caps.color_supported);
        assert!(caps.collate_supported);
        assert_eq!(caps.output_bins, vec!["face-down", "stacker-1"]);
        assert!(caps.options["finishings"].contains("staple"));
        assert!(simplex_mono("m").capabilities.supports_sides(DuplexMode::Simplex));
        assert!(!simplex_mono("m").capabilities.supports_sides(DuplexMode::LongEdge));
    }
}
