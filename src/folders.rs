use super::*;

const SPEC_TEMPLATES: &[&str] = &[
    "pyklip-S{date}-{band}-k150a9s4m1-KLmodes-all.fits",
    "pyklip-S{date}-{band}-k100a9s4m1-KLmodes-all.fits",
];

const POL_TEMPLATES: &[&str] = &[
    "S{date}-{band}-pol_podc_combined_rstokesdc.fits",
    "S{date}_podc_combined_rstokesdc.fits",
];

/// A dataset folder name of the form `{date}_{band}_{mode}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct DatasetName {
    pub(super) date: String,
    pub(super) band: String,
    pub(super) mode: String,
}

impl DatasetName {
    pub(super) fn parse(name: &str) -> Option<Self> {
        let mut parts = name.splitn(3, '_');
        let date = parts.next().filter(|part| !part.is_empty())?;
        let band = parts.next().filter(|part| !part.is_empty())?;
        let mode = parts.next().filter(|part| !part.is_empty())?;
        Some(DatasetName {
            date: date.to_string(),
            band: band.to_string(),
            mode: mode.to_string(),
        })
    }

    /// `20160229` -> `2016-02-29`; anything else is shown as-is.
    pub(super) fn display_date(&self) -> String {
        let date = &self.date;
        match (date.get(0..4), date.get(4..6), date.get(6..8)) {
            (Some(year), Some(month), Some(day))
                if date.len() == 8 && date.chars().all(|c| c.is_ascii_digit()) =>
            {
                format!("{}-{}-{}", year, month, day)
            }
            _ => date.clone(),
        }
    }

    fn short_date(&self) -> &str {
        if self.date.len() == 8 {
            self.date.get(2..).unwrap_or(&self.date)
        } else {
            &self.date
        }
    }
}

/// Picks the dataset folder that best matches `filter`.
///
/// Explicit date/band/mode filters are applied first. When several folders
/// survive, an unspecified mode prefers `_Spec` and then an unspecified band
/// prefers `_H_`; a preference that matches nothing is skipped. Ties go to
/// the first remaining candidate.
pub(super) fn select_folder<'a>(candidates: &'a [String], filter: &FilterSpec) -> Option<&'a str> {
    let mut remaining: Vec<&str> = candidates.iter().map(String::as_str).collect();
    if remaining.is_empty() {
        return None;
    }

    if let Some(date) = &filter.date {
        let needle = format!("{}_", date);
        remaining.retain(|name| name.contains(&needle));
    }
    if let Some(band) = &filter.band {
        let needle = format!("_{}_", band);
        remaining.retain(|name| name.contains(&needle));
    }
    if let Some(mode) = &filter.mode {
        let needle = format!("_{}", mode);
        remaining.retain(|name| name.contains(&needle));
    }

    if remaining.len() > 1 {
        if filter.mode.is_none() {
            narrow_if_any(&mut remaining, "_Spec");
        }
        if filter.band.is_none() {
            narrow_if_any(&mut remaining, "_H_");
        }
    }

    remaining.first().copied()
}

fn narrow_if_any(remaining: &mut Vec<&str>, needle: &str) {
    if remaining.iter().any(|name| name.contains(needle)) {
        remaining.retain(|name| name.contains(needle));
    }
}

pub(super) fn object_dir(data_root: &Path, object_name: &str) -> PathBuf {
    data_root.join(object_name.trim().replace(' ', "_"))
}

/// Immediate subdirectory names of `dir`, sorted. `None` if `dir` is missing.
pub(super) fn list_subdirectories(dir: &Path) -> Result<Option<Vec<String>>> {
    if !dir.is_dir() {
        return Ok(None);
    }
    let mut names = Vec::new();
    let entries = fs::read_dir(dir).with_context(|| format!("read dir {}", dir.display()))?;
    for entry in entries {
        let entry = entry.with_context(|| format!("read dir entry {}", dir.display()))?;
        let file_type = entry
            .file_type()
            .with_context(|| format!("read file type {}", entry.path().display()))?;
        if !file_type.is_dir() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_string());
        }
    }
    names.sort();
    Ok(Some(names))
}

/// Candidate artifact file names for a dataset, newest naming scheme first.
pub(super) fn artifact_candidates(dataset: &DatasetName) -> Vec<String> {
    let templates: &[&str] = match dataset.mode.as_str() {
        "Spec" => SPEC_TEMPLATES,
        "Pol" => POL_TEMPLATES,
        _ => &[],
    };
    templates
        .iter()
        .map(|template| {
            template
                .replace("{date}", &dataset.date)
                .replace("{band}", &dataset.band)
        })
        .collect()
}

/// The first candidate artifact that exists in `dataset_dir`.
pub(super) fn resolve_artifact(dataset_dir: &Path, dataset: &DatasetName) -> Option<PathBuf> {
    artifact_candidates(dataset)
        .into_iter()
        .map(|name| dataset_dir.join(name))
        .find(|path| path.is_file())
}

/// Output file name and caption for a preview, e.g.
/// `HD_95086_160229_H_Spec.png` and `HD 95086 2016-02-29 H-Spec`.
pub(super) fn preview_names(object_name: &str, dataset: &DatasetName) -> (String, String) {
    let object = object_name.trim();
    let file_name = format!(
        "{}_{}_{}_{}.png",
        object.replace(' ', "_"),
        dataset.short_date(),
        dataset.band,
        dataset.mode
    );
    let caption = format!(
        "{} {} {}-{}",
        object.replace('_', " "),
        dataset.display_date(),
        dataset.band,
        dataset.mode
    );
    (file_name, caption)
}

/// Recovers the object name and dataset from `.../{Object}/{date_band_mode}/{file}`.
pub(super) fn dataset_from_artifact_path(path: &Path) -> Option<(String, DatasetName)> {
    let dataset_dir = path.parent()?;
    let dataset = DatasetName::parse(dataset_dir.file_name()?.to_str()?)?;
    let object = dataset_dir.parent()?.file_name()?.to_str()?;
    Some((object.replace('_', " "), dataset))
}
