// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Proxy-print cost: price a complete job for a given printer.
//
// Rate precedence: explicit custom override, then the cost of the assigned
// media source, then the printer's own charge type.

use std::collections::BTreeMap;
use std::str::FromStr;

use pagetally_core::config::AppConfig;
use pagetally_core::error::{PageTallyError, Result};
use pagetally_core::types::CostResult;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::media::{CoverPages, calc_media_cost, sheets_per_copy};

/// Media keyword used when a MEDIA printer has no entry for the job's media.
pub const DEFAULT_MEDIA_KEY: &str = "default";

/// Per-side rate split by colour mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PageRate {
    pub grayscale: Decimal,
    pub color: Decimal,
}

impl PageRate {
    pub fn for_mode(&self, grayscale: bool) -> Decimal {
        if grayscale { self.grayscale } else { self.color }
    }
}

/// One-sided and two-sided rates for one medium.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MediaCost {
    pub one_sided: PageRate,
    pub two_sided: PageRate,
}

/// How a printer charges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeType {
    /// One flat rate regardless of media.
    Simple,
    /// Rate looked up per media keyword.
    Media,
}

impl FromStr for ChargeType {
    type Err = PageTallyError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "SIMPLE" => Ok(Self::Simple),
            "MEDIA" => Ok(Self::Media),
            other => Err(PageTallyError::UnsupportedChargeType(other.to_string())),
        }
    }
}

/// Cost settings of a printer as configured by the administrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrinterCostProfile {
    pub printer_name: String,
    /// Raw charge type attribute ("SIMPLE" or "MEDIA").
    pub charge_type: String,
    /// Rates used by SIMPLE printers.
    pub default_cost: MediaCost,
    /// Rates per media keyword used by MEDIA printers.
    pub media_costs: BTreeMap<String, MediaCost>,
}

impl PrinterCostProfile {
    /// A SIMPLE printer charging `one_sided`/`two_sided` for every medium.
    pub fn simple(printer_name: impl Into<String>, default_cost: MediaCost) -> Self {
        Self {
            printer_name: printer_name.into(),
            charge_type: "SIMPLE".into(),
            default_cost,
            media_costs: BTreeMap::new(),
        }
    }

    fn media_cost(&self, media: Option<&str>) -> Result<MediaCost> {
        match self.charge_type.parse::<ChargeType>()? {
            ChargeType::Simple => Ok(self.default_cost),
            ChargeType::Media => Ok(media
                .and_then(|m| self.media_costs.get(m))
                .or_else(|| self.media_costs.get(DEFAULT_MEDIA_KEY))
                .copied()
                .unwrap_or(self.default_cost)),
        }
    }
}

/// Everything needed to price one proxy-print job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostParms {
    pub pages: u32,
    /// Page counts of the source documents a job was assembled from.
    /// Empty means a single document of `pages` pages.
    pub logical_job_pages: Vec<u32>,
    pub copies: u32,
    pub duplex: bool,
    pub pages_per_side: u32,
    pub grayscale: bool,
    pub eco_print: bool,
    pub media: Option<String>,
    /// Cost of the media source the job is assigned to.
    pub media_source_cost: Option<MediaCost>,
    /// Explicit per-side override, wins over everything else.
    pub custom_cost: Option<MediaCost>,
    /// Leading pages of the logical job printed as covers.
    pub cover_pages: u32,
    /// Per cover page, per copy.
    pub custom_cost_cover: Option<Decimal>,
    /// Per physical sheet, per copy.
    pub custom_cost_sheet: Option<Decimal>,
    /// Per copy.
    pub custom_cost_copy: Option<Decimal>,
    /// Once per job.
    pub custom_cost_set: Option<Decimal>,
}

impl CostParms {
    /// Plain parameters for a single document.
    pub fn new(pages: u32, copies: u32) -> Self {
        Self {
            pages,
            logical_job_pages: Vec::new(),
            copies,
            duplex: false,
            pages_per_side: 1,
            grayscale: true,
            eco_print: false,
            media: None,
            media_source_cost: None,
            custom_cost: None,
            cover_pages: 0,
            custom_cost_cover: None,
            custom_cost_sheet: None,
            custom_cost_copy: None,
            custom_cost_set: None,
        }
    }

    fn chunks(&self) -> Vec<u32> {
        if self.logical_job_pages.is_empty() {
            vec![self.pages]
        } else {
            self.logical_job_pages.clone()
        }
    }
}

/// Price a proxy-print job on `printer`.
///
/// An unknown charge type is a configuration fault and fails the request;
/// there is no fallback price.
#[instrument(skip_all, fields(printer = %printer.printer_name, pages = parms.pages, copies = parms.copies))]
pub fn calc_proxy_print_cost(
    printer: &PrinterCostProfile,
    parms: &CostParms,
    config: &AppConfig,
) -> Result<CostResult> {
    let rates = match (parms.custom_cost, parms.media_source_cost) {
        (Some(custom), _) => custom,
        (None, Some(source)) => source,
        (None, None) => printer.media_cost(parms.media.as_deref())?,
    };
    let one_sided = rates.one_sided.for_mode(parms.grayscale);
    let two_sided = rates.two_sided.for_mode(parms.grayscale);

    let discount = if parms.eco_print {
        config.eco_print_discount()
    } else {
        Decimal::ZERO
    };

    let mut covers = CoverPages::new(parms.cover_pages);
    let mut media = Decimal::ZERO;
    let mut sheets = 0u32;

    for chunk in parms.chunks() {
        let billable = covers.take(chunk);
        media += calc_media_cost(
            billable,
            parms.pages_per_side,
            parms.copies,
            parms.duplex,
            one_sided,
            two_sided,
            discount,
        );
        sheets += sheets_per_copy(chunk, parms.pages_per_side, parms.duplex);
    }

    let copies = Decimal::from(parms.copies);

    if let Some(rate) = parms.custom_cost_cover {
        media += rate * Decimal::from(covers.consumed()) * copies;
    }

    let result = CostResult {
        media,
        sheet: parms
            .custom_cost_sheet
            .map(|rate| rate * Decimal::from(sheets) * copies)
            .unwrap_or_default(),
        copy: parms
            .custom_cost_copy
            .map(|rate| rate * copies)
            .unwrap_or_default(),
        set: parms.custom_cost_set.unwrap_or_default(),
    };

    debug!(total = %result.total(), "proxy print cost calculated");
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn rates(one_gray: Decimal, one_color: Decimal, two_gray: Decimal, two_color: Decimal) -> MediaCost {
        MediaCost {
            one_sided: PageRate {
                grayscale: one_gray,
                color: one_color,
            },
            two_sided: PageRate {
                grayscale: two_gray,
                color: two_color,
            },
        }
    }

    fn simple_printer() -> PrinterCostProfile {
        PrinterCostProfile::simple("lobby", rates(dec!(0.10), dec!(0.50), dec!(0.08), dec!(0.40)))
    }

    fn media_printer() -> PrinterCostProfile {
        let mut printer = simple_printer();
        printer.charge_type = "MEDIA".into();
        printer
            .media_costs
            .insert("iso_a3_297x420mm".into(), rates(dec!(0.20), dec!(1.00), dec!(0.16), dec!(0.80)));
        printer
            .media_costs
            .insert(DEFAULT_MEDIA_KEY.into(), rates(dec!(0.12), dec!(0.60), dec!(0.10), dec!(0.50)));
        printer
    }

    #[test]
    fn simple_printer_grayscale_and_color() {
        let config = AppConfig::default();
        let mut parms = CostParms::new(10, 2);
        let gray = calc_proxy_print_cost(&simple_printer(), &parms, &config).unwrap();
        assert_eq!(gray.total(), dec!(2.00));

        parms.grayscale = false;
        let color = calc_proxy_print_cost(&simple_printer(), &parms, &config).unwrap();
        assert_eq!(color.total(), dec!(10.00));
    }

    #[test]
    fn media_printer_looks_up_media_then_default() {
        let config = AppConfig::default();
        let mut parms = CostParms::new(1, 1);
        parms.media = Some("iso_a3_297x420mm".into());
        assert_eq!(
            calc_proxy_print_cost(&media_printer(), &parms, &config).unwrap().media,
            dec!(0.20)
        );

        parms.media = Some("na_letter_8.5x11in".into());
        assert_eq!(
            calc_proxy_print_cost(&media_printer(), &parms, &config).unwrap().media,
            dec!(0.12)
        );
    }

    #[test]
    fn override_precedence() {
        let config = AppConfig::default();
        let mut parms = CostParms::new(1, 1);
        parms.media_source_cost = Some(rates(dec!(0.03), dec!(0.3), dec!(0.02), dec!(0.2)));
        assert_eq!(
            calc_proxy_print_cost(&simple_printer(), &parms, &config).unwrap().media,
            dec!(0.03)
        );

        parms.custom_cost = Some(rates(dec!(0.01), dec!(0.1), dec!(0.01), dec!(0.1)));
        assert_eq!(
            calc_proxy_print_cost(&simple_printer(), &parms, &config).unwrap().media,
            dec!(0.01)
        );
    }

    #[test]
    fn unsupported_charge_type_is_fatal() {
        let mut printer = simple_printer();
        printer.charge_type = "PER_INK".into();
        let err = calc_proxy_print_cost(&printer, &CostParms::new(1, 1), &AppConfig::default())
            .unwrap_err();
        assert!(matches!(err, PageTallyError::UnsupportedChargeType(ref t) if t == "PER_INK"));
        assert!(err.is_invariant_violation());
    }

    #[test]
    fn eco_print_discount_from_config() {
        let mut config = AppConfig::default();
        config.eco_print_discount_percent = dec!(20);
        let mut parms = CostParms::new(10, 1);
        parms.eco_print = true;
        let cost = calc_proxy_print_cost(&simple_printer(), &parms, &config).unwrap();
        assert_eq!(cost.media, dec!(0.80));
    }

    #[test]
    fn logical_sub_jobs_are_priced_per_chunk() {
        let config = AppConfig::default();
        // Two 3-page documents duplexed separately: each 2 two-sided + 1 one-sided.
        let mut parms = CostParms::new(6, 1);
        parms.duplex = true;
        parms.logical_job_pages = vec![3, 3];
        let chunked = calc_proxy_print_cost(&simple_printer(), &parms, &config).unwrap();
        assert_eq!(chunked.media, dec!(0.52));

        parms.logical_job_pages.clear();
        let whole = calc_proxy_print_cost(&simple_printer(), &parms, &config).unwrap();
        assert_eq!(whole.media, dec!(0.48));
    }

    #[test]
    fn cover_pages_priced_separately() {
        let config = AppConfig::default();
        let mut parms = CostParms::new(5, 2);
        parms.logical_job_pages = vec![1, 4];
        parms.cover_pages = 2;
        parms.custom_cost_cover = Some(dec!(0.25));
        let cost = calc_proxy_print_cost(&simple_printer(), &parms, &config).unwrap();
        // 3 billable pages * 0.10 * 2 copies + 2 covers * 0.25 * 2 copies
        assert_eq!(cost.media, dec!(1.60));
    }

    #[test]
    fn flat_overrides_are_added() {
        let config = AppConfig::default();
        let mut parms = CostParms::new(4, 3);
        parms.duplex = true;
        parms.custom_cost_sheet = Some(dec!(0.05));
        parms.custom_cost_copy = Some(dec!(0.50));
        parms.custom_cost_set = Some(dec!(2));
        let cost = calc_proxy_print_cost(&simple_printer(), &parms, &config).unwrap();
        assert_eq!(cost.media, dec!(0.96));
        assert_eq!(cost.sheet, dec!(0.30));
        assert_eq!(cost.copy, dec!(1.50));
        assert_eq!(cost.set, dec!(2));
        assert_eq!(cost.total(), dec!(4.76));
    }
}
