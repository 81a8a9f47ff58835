use crate::config::AppConfig;
use crate::data::Dataset;
use crate::processing::{aggregate_condition_proportions, aggregate_steward_health};
use crate::types::{Borough, HeatTable, Health, ProportionTable, Steward};
use anyhow::{Context, Result};
use image::{ImageBuffer, Rgba, RgbaImage};
use rayon::prelude::*;
use std::collections::{BTreeMap, HashSet};
use std::fmt::Write;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

const CHART_WIDTH: f64 = 640.0;
const CHART_HEIGHT: f64 = 440.0;
const MARGIN_TOP: f64 = 70.0;
const MARGIN_RIGHT: f64 = 120.0;
const MARGIN_BOTTOM: f64 = 60.0;
const MARGIN_LEFT: f64 = 70.0;

// Dark template
const COLOR_BACKGROUND: &str = "#111111";
const COLOR_TEXT: &str = "#f2f5fa";
const COLOR_AXIS: &str = "#506784";
const CONDITION_COLORS: [&str; 3] = ["#636efa", "#ef553b", "#00cc96"];

// Plasma, sampled at even steps from 0 to 1
const HEAT_SCALE: [(u8, u8, u8); 5] = [
    (13, 8, 135),
    (126, 3, 168),
    (204, 71, 120),
    (248, 149, 64),
    (240, 249, 33),
];

pub const NO_DATA_MESSAGE: &str = "No data for selection";

/// Chart title, e.g. "Pin Oak Health in NYC".
pub fn bar_chart_title(species: &str) -> String {
    format!("{} Health in NYC", title_case(species))
}

/// Grouped bar chart: boroughs on x, one bar per condition, y fixed to [0, 1].
pub fn render_bar_chart_svg(species: &str, table: &ProportionTable) -> String {
    let mut svg = svg_open();
    text(&mut svg, CHART_WIDTH / 2.0, 35.0, 18, "middle", &bar_chart_title(species));

    if table.is_empty() {
        placeholder(&mut svg);
        svg.push_str("</svg>");
        return svg;
    }

    let plot_width = CHART_WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
    let plot_height = CHART_HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;
    let baseline = MARGIN_TOP + plot_height;

    // Y axis ticks, no grid lines
    for step in 0..=5 {
        let value = step as f64 * 0.2;
        let y = baseline - value * plot_height;
        text(&mut svg, MARGIN_LEFT - 10.0, y + 4.0, 11, "end", &format!("{:.1}", value));
    }
    let _ = write!(
        svg,
        r#"<line x1="{x}" y1="{b}" x2="{x2}" y2="{b}" stroke="{c}"/>"#,
        x = MARGIN_LEFT,
        x2 = MARGIN_LEFT + plot_width,
        b = baseline,
        c = COLOR_AXIS
    );

    let group_width = plot_width / Borough::ALL.len() as f64;
    let bar_width = group_width * 0.8 / Health::ALL.len() as f64;

    for borough in Borough::ALL {
        let group_x = MARGIN_LEFT + borough.index() as f64 * group_width + group_width * 0.1;
        for condition in Health::ALL {
            let value = table.get(borough, condition).clamp(0.0, 1.0);
            let height = value * plot_height;
            let _ = write!(
                svg,
                r#"<rect x="{:.1}" y="{:.1}" width="{:.1}" height="{:.1}" fill="{}"><title>{}, {}: {:.2}</title></rect>"#,
                group_x + condition.index() as f64 * bar_width,
                baseline - height,
                bar_width,
                height,
                CONDITION_COLORS[condition.index()],
                borough,
                condition,
                value
            );
        }
        text(&mut svg, group_x + group_width * 0.4, baseline + 18.0, 11, "middle", borough.label());
    }

    text(&mut svg, MARGIN_LEFT + plot_width / 2.0, CHART_HEIGHT - 15.0, 12, "middle", "borough");
    let _ = write!(
        svg,
        r#"<text x="20" y="{y}" transform="rotate(-90 20 {y})" text-anchor="middle" font-family="Arial, sans-serif" font-size="12" fill="{c}">Proportion</text>"#,
        y = MARGIN_TOP + plot_height / 2.0,
        c = COLOR_TEXT
    );

    // Legend
    let legend_x = CHART_WIDTH - MARGIN_RIGHT + 20.0;
    text(&mut svg, legend_x, MARGIN_TOP, 12, "start", "Condition");
    for condition in Health::ALL {
        let y = MARGIN_TOP + 20.0 + condition.index() as f64 * 20.0;
        let _ = write!(
            svg,
            r#"<rect x="{}" y="{}" width="12" height="12" fill="{}"/>"#,
            legend_x,
            y - 10.0,
            CONDITION_COLORS[condition.index()]
        );
        text(&mut svg, legend_x + 18.0, y, 11, "start", condition.label());
    }

    svg.push_str("</svg>");
    svg
}

/// Health by steward matrix, steward labels along the top.
pub fn render_heatmap_svg(table: &HeatTable) -> String {
    let mut svg = svg_open();

    if table.is_empty() {
        placeholder(&mut svg);
        svg.push_str("</svg>");
        return svg;
    }

    let plot_width = CHART_WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
    let plot_height = CHART_HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;
    let cell_w = plot_width / Steward::HEATMAP_ORDER.len() as f64;
    let cell_h = plot_height / Health::ALL.len() as f64;
    let max = color_range(table);

    text(&mut svg, MARGIN_LEFT + plot_width / 2.0, 20.0, 12, "middle", "Steward");
    for steward in Steward::HEATMAP_ORDER {
        let x = MARGIN_LEFT + (steward.heatmap_column() as f64 + 0.5) * cell_w;
        text(&mut svg, x, MARGIN_TOP - 10.0, 11, "middle", steward.label());
    }

    for health in Health::ALL {
        let y = MARGIN_TOP + health.index() as f64 * cell_h;
        text(&mut svg, MARGIN_LEFT - 10.0, y + cell_h / 2.0 + 4.0, 11, "end", health.label());
        for steward in Steward::HEATMAP_ORDER {
            let value = table.get(health, steward);
            let (r, g, b) = heat_color(value / max);
            let _ = write!(
                svg,
                r#"<rect x="{:.1}" y="{:.1}" width="{:.1}" height="{:.1}" fill="rgb({},{},{})"><title>{}, {}: {:.4}</title></rect>"#,
                MARGIN_LEFT + steward.heatmap_column() as f64 * cell_w,
                y,
                cell_w,
                cell_h,
                r,
                g,
                b,
                health,
                steward,
                value
            );
        }
    }
    let _ = write!(
        svg,
        r#"<text x="20" y="{y}" transform="rotate(-90 20 {y})" text-anchor="middle" font-family="Arial, sans-serif" font-size="12" fill="{c}">Health</text>"#,
        y = MARGIN_TOP + plot_height / 2.0,
        c = COLOR_TEXT
    );

    // Colour bar
    let bar_x = CHART_WIDTH - MARGIN_RIGHT + 30.0;
    text(&mut svg, bar_x, MARGIN_TOP - 10.0, 11, "start", "Percent of Trees");
    let steps = 20;
    for i in 0..steps {
        let t = 1.0 - i as f64 / steps as f64;
        let (r, g, b) = heat_color(t);
        let _ = write!(
            svg,
            r#"<rect x="{}" y="{:.1}" width="16" height="{:.1}" fill="rgb({},{},{})"/>"#,
            bar_x,
            MARGIN_TOP + i as f64 * plot_height / steps as f64,
            plot_height / steps as f64 + 0.5,
            r,
            g,
            b
        );
    }
    text(&mut svg, bar_x + 22.0, MARGIN_TOP + 8.0, 10, "start", &format!("{:.2}", max));
    text(&mut svg, bar_x + 22.0, MARGIN_TOP + plot_height, 10, "start", "0");

    svg.push_str("</svg>");
    svg
}

/// Raster version of the heatmap, one `cell_px` square per cell.
pub fn render_heatmap_png(table: &HeatTable, cell_px: u32) -> RgbaImage {
    let cell_px = cell_px.max(1);
    let cols = Steward::HEATMAP_ORDER.len() as u32;
    let rows = Health::ALL.len() as u32;
    let max = color_range(table);

    ImageBuffer::from_fn(cols * cell_px, rows * cell_px, |x, y| {
        if table.is_empty() {
            return Rgba([0x11, 0x11, 0x11, 255]);
        }
        let value = table.values[(y / cell_px) as usize][(x / cell_px) as usize];
        let (r, g, b) = heat_color(value / max);
        Rgba([r, g, b, 255])
    })
}

/// Pre-render every chart for every species into `chart_dir/<species-slug>/`.
pub fn generate_charts(config: &AppConfig, dataset: &Dataset) -> Result<()> {
    let out_dir = &config.output.chart_dir;
    fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create chart directory: {:?}", out_dir))?;
    info!(species = dataset.species().len(), dir = ?out_dir, "Generating charts");

    let dirs = species_dirs(dataset.species());
    let index: BTreeMap<&str, &str> = dataset
        .species()
        .iter()
        .map(String::as_str)
        .zip(dirs.iter().map(String::as_str))
        .collect();
    fs::write(out_dir.join("index.json"), serde_json::to_vec_pretty(&index)?)
        .context("Failed to write chart index")?;

    let failures: Vec<(String, anyhow::Error)> = dataset
        .species()
        .par_iter()
        .zip(dirs.par_iter())
        .filter_map(|(species, dir)| {
            render_species(config, dataset, species, &out_dir.join(dir))
                .err()
                .map(|e| (species.clone(), e))
        })
        .collect();

    for (species, err) in &failures {
        warn!(species = %species, "Failed to render charts: {:#}", err);
    }
    if let Some((species, err)) = failures.into_iter().next() {
        return Err(err.context(format!("Chart generation failed for '{}'", species)));
    }

    Ok(())
}

fn render_species(config: &AppConfig, dataset: &Dataset, species: &str, dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).context("Failed to create species directory")?;

    let bars = aggregate_condition_proportions(dataset.filter_species(species));
    fs::write(dir.join("condition.svg"), render_bar_chart_svg(species, &bars))?;
    fs::write(dir.join("condition.json"), serde_json::to_vec_pretty(&bars)?)?;

    for borough in Borough::ALL {
        let heat = aggregate_steward_health(dataset.filter_borough_species(borough, species));
        let name = slug(borough.label());
        fs::write(dir.join(format!("steward-{}.svg", name)), render_heatmap_svg(&heat))?;
        let path = dir.join(format!("steward-{}.png", name));
        render_heatmap_png(&heat, config.output.heatmap_cell_px)
            .save(&path)
            .with_context(|| format!("Failed to save heatmap {:?}", path))?;
    }

    Ok(())
}

/// One directory name per species, in the same order. Slugs that collide
/// get a numeric suffix; names with no alphanumerics become `species`.
pub fn species_dirs(species: &[String]) -> Vec<String> {
    let mut used = HashSet::new();
    species
        .iter()
        .map(|name| {
            let base = match slug(name) {
                s if s.is_empty() => "species".to_string(),
                s => s,
            };
            let mut candidate = base.clone();
            let mut n = 2;
            while !used.insert(candidate.clone()) {
                candidate = format!("{}-{}", base, n);
                n += 1;
            }
            candidate
        })
        .collect()
}

/// Lowercase, with runs of non-alphanumerics collapsed to '-'.
pub fn slug(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.is_empty() && !out.ends_with('-') {
            out.push('-');
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

/// Capitalise the first letter of every word; a word starts after any non-letter.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_alpha = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}

fn color_range(table: &HeatTable) -> f64 {
    let max = table.max_value();
    if max > 0.0 { max } else { 1.0 }
}

fn heat_color(t: f64) -> (u8, u8, u8) {
    let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
    let scaled = t * (HEAT_SCALE.len() - 1) as f64;
    let i = (scaled.floor() as usize).min(HEAT_SCALE.len() - 2);
    let frac = scaled - i as f64;
    let (a, b) = (HEAT_SCALE[i], HEAT_SCALE[i + 1]);
    let lerp = |x: u8, y: u8| (x as f64 + (y as f64 - x as f64) * frac).round() as u8;
    (lerp(a.0, b.0), lerp(a.1, b.1), lerp(a.2, b.2))
}

fn svg_open() -> String {
    let mut svg = String::new();
    let _ = write!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 {w} {h}" width="{w}" height="{h}"><rect width="{w}" height="{h}" fill="{bg}"/>"#,
        w = CHART_WIDTH,
        h = CHART_HEIGHT,
        bg = COLOR_BACKGROUND
    );
    svg
}

fn placeholder(svg: &mut String) {
    text(svg, CHART_WIDTH / 2.0, CHART_HEIGHT / 2.0, 16, "middle", NO_DATA_MESSAGE);
}

fn text(svg: &mut String, x: f64, y: f64, size: u32, anchor: &str, content: &str) {
    let _ = write!(
        svg,
        r#"<text x="{:.1}" y="{:.1}" text-anchor="{}" font-family="Arial, sans-serif" font-size="{}" fill="{}">{}</text>"#,
        x,
        y,
        anchor,
        size,
        COLOR_TEXT,
        escape_xml(content)
    );
}

fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TreeRecord;

    fn sample_heat() -> HeatTable {
        let subset = vec![
            TreeRecord::new("pin oak", Borough::Bronx, Health::Good, Some(Steward::NoSteward)),
            TreeRecord::new("pin oak", Borough::Bronx, Health::Poor, Some(Steward::FourOrMore)),
        ];
        aggregate_steward_health(&subset)
    }

    #[test]
    fn test_title_case_matches_word_boundaries() {
        assert_eq!(title_case("pin oak"), "Pin Oak");
        assert_eq!(title_case("'schubert' chokecherry"), "'Schubert' Chokecherry");
        assert_eq!(bar_chart_title("london planetree"), "London Planetree Health in NYC");
    }

    #[test]
    fn test_slug() {
        assert_eq!(slug("Staten Island"), "staten-island");
        assert_eq!(slug("'Schubert' chokecherry"), "schubert-chokecherry");
    }

    #[test]
    fn test_species_dirs_are_unique() {
        let species: Vec<String> = ["'Schubert' chokecherry", "schubert chokecherry", "???", "!!", "pin oak"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            species_dirs(&species),
            vec![
                "schubert-chokecherry",
                "schubert-chokecherry-2",
                "species",
                "species-2",
                "pin-oak",
            ]
        );
    }

    #[test]
    fn test_bar_chart_has_fifteen_bars() {
        let subset = vec![TreeRecord::new("pin oak", Borough::Queens, Health::Good, None)];
        let svg = render_bar_chart_svg("pin oak", &aggregate_condition_proportions(&subset));
        assert!(svg.contains("Pin Oak Health in NYC"));
        assert_eq!(svg.matches("<title>").count(), 15);
        assert!(svg.contains("Queens, Good: 1.00"));
        assert!(!svg.contains(NO_DATA_MESSAGE));
    }

    #[test]
    fn test_empty_tables_render_placeholder() {
        let none: Vec<TreeRecord> = Vec::new();
        let bars = render_bar_chart_svg("ginkgo", &aggregate_condition_proportions(&none));
        assert!(bars.contains(NO_DATA_MESSAGE));
        let heat = render_heatmap_svg(&aggregate_steward_health(&none));
        assert!(heat.contains(NO_DATA_MESSAGE));
    }

    #[test]
    fn test_heatmap_labels_follow_fixed_orders() {
        let svg = render_heatmap_svg(&sample_heat());
        let four = svg.find(">4orMore<").unwrap();
        let none = svg.find(">None<").unwrap();
        assert!(four < none);
        let good = svg.find(">Good<").unwrap();
        let poor = svg.find(">Poor<").unwrap();
        assert!(good < poor);
        assert!(svg.contains("Percent of Trees"));
        assert_eq!(svg.matches("<title>").count(), 12);
    }

    #[test]
    fn test_species_names_are_escaped() {
        let none: Vec<TreeRecord> = Vec::new();
        let svg = render_bar_chart_svg("<oak & elm>", &aggregate_condition_proportions(&none));
        assert!(svg.contains("&lt;Oak &amp; Elm&gt;"));
    }

    #[test]
    fn test_heatmap_png_dimensions_and_extremes() {
        let img = render_heatmap_png(&sample_heat(), 10);
        assert_eq!(img.dimensions(), (40, 30));
        // Good/None holds the maximum, Good/4orMore is zero
        assert_eq!(img.get_pixel(35, 5), &Rgba([240, 249, 33, 255]));
        assert_eq!(img.get_pixel(5, 5), &Rgba([13, 8, 135, 255]));
    }

    #[test]
    fn test_heat_color_endpoints() {
        assert_eq!(heat_color(0.0), HEAT_SCALE[0]);
        assert_eq!(heat_color(1.0), HEAT_SCALE[4]);
        assert_eq!(heat_color(f64::NAN), HEAT_SCALE[0]);
    }
}
