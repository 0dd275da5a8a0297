//! Assembly of the external engine's processing configuration (topsApp XML)
//! from the upstream stage status records.

use crate::core::dem::{DemManager, DemStatus};
use crate::core::geometry::{self, RegionOfInterest};
use crate::core::orbit::OrbitStatus;
use crate::core::selection::SelectionStatus;
use crate::types::{BoundingBox, InsarError, InsarResult};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::path::{Path, PathBuf};

/// Phase unwrapping method requested from the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unwrapper {
    Snaphu,
    Icu,
}

impl std::fmt::Display for Unwrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Unwrapper::Snaphu => write!(f, "snaphu"),
            Unwrapper::Icu => write!(f, "icu"),
        }
    }
}

/// Products the engine is asked to geocode explicitly
const GEOCODE_LIST: &[&str] = &[
    "merged/phsig.cor",
    "merged/filt_topophase.unw",
    "merged/los.rdr",
    "merged/topophase.flat",
    "merged/filt_topophase.flat",
    "merged/topophase.cor",
    "merged/z.rdr",
    "merged/lat.rdr",
    "merged/lon.rdr",
];

/// Assembly options. The region of interest here is the *narrow processing*
/// extent; it is intersected with the DEM's own coverage and is independent
/// of the wide bound the DEM was fetched over.
#[derive(Debug, Clone)]
pub struct ConfigOptions {
    pub roi: Option<RegionOfInterest>,
    pub unwrapper: Unwrapper,
    pub use_gpu: bool,
    pub swaths: Vec<u8>,
}

impl Default for ConfigOptions {
    fn default() -> Self {
        Self {
            roi: None,
            unwrapper: Unwrapper::Snaphu,
            use_gpu: true,
            swaths: vec![1, 2, 3],
        }
    }
}

/// Builds the topsApp configuration in a working directory, symlinking the
/// input data alongside it the way the engine expects.
pub struct ConfigAssembler {
    work_dir: PathBuf,
}

impl ConfigAssembler {
    pub fn new<P: Into<PathBuf>>(work_dir: P) -> InsarResult<Self> {
        let work_dir = work_dir.into();
        std::fs::create_dir_all(&work_dir)?;
        Ok(Self { work_dir })
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Assemble `topsApp.xml` from the three upstream status records.
    ///
    /// The assembler depends only on the records, never on stage internals.
    pub fn assemble(
        &self,
        selection: &SelectionStatus,
        orbit: &OrbitStatus,
        dem: &DemStatus,
        options: &ConfigOptions,
    ) -> InsarResult<PathBuf> {
        let (reference_raw, secondary_raw) = selection.pairs.first().ok_or_else(|| {
            InsarError::Configuration("selection stage exposed no processing pairs".to_string())
        })?;

        let reference_path = resolve_real_path(reference_raw)?;
        let secondary_path = resolve_real_path(secondary_raw)?;

        let dem_src = dem.dem_path.as_ref().filter(|p| p.exists()).ok_or_else(|| {
            InsarError::Configuration("elevation stage exposed no DEM path".to_string())
        })?;

        create_symlink(&reference_path, &self.work_dir.join(file_name(&reference_path)))?;
        create_symlink(&secondary_path, &self.work_dir.join(file_name(&secondary_path)))?;
        create_symlink(dem_src, &self.work_dir.join("dem.wgs84"))?;

        let dem_sidecar = DemManager::sidecar_path(dem_src);
        if dem_sidecar.exists() {
            create_symlink(&dem_sidecar, &self.work_dir.join("dem.wgs84.xml"))?;
        }

        let final_roi = self.clip_roi(options.roi.as_ref(), dem.bounds)?;

        let xml_path = self.work_dir.join("topsApp.xml");
        let xml = build_topsapp_xml(
            &reference_path,
            &secondary_path,
            orbit,
            final_roi,
            options,
        )?;
        std::fs::write(&xml_path, xml)?;

        log::info!("Config generated: {}", xml_path.display());
        Ok(xml_path)
    }

    /// Intersect the requested ROI with the DEM's own coverage. No overlap
    /// means the region is treated as unset, never a failed run.
    fn clip_roi(
        &self,
        roi: Option<&RegionOfInterest>,
        dem_bounds: Option<BoundingBox>,
    ) -> InsarResult<Option<BoundingBox>> {
        let roi = match roi {
            Some(roi) => roi,
            None => return Ok(None),
        };

        let dem_bounds = match dem_bounds {
            Some(bounds) => bounds,
            None => {
                log::warn!("DEM bounds unknown; using ROI as given");
                return Ok(Some(roi.bounds()?));
            }
        };

        match geometry::roi_intersection(roi, &dem_bounds)? {
            Some(clipped) => {
                log::info!("ROI clipped to DEM coverage: {:?}", clipped.to_snwe());
                Ok(Some(clipped))
            }
            None => {
                log::warn!("ROI does not overlap the DEM; region of interest unset");
                Ok(None)
            }
        }
    }
}

/// Probe for a scene file on disk, tolerating the `-SLC` suffix variant in
/// either direction. Auto-corrections are logged, not silently applied.
pub fn resolve_real_path(input: &Path) -> InsarResult<PathBuf> {
    if input.exists() {
        return Ok(input.to_path_buf());
    }

    let name = input
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string();

    if name.ends_with("-SLC.zip") {
        let candidate = input.with_file_name(name.replace("-SLC.zip", ".zip"));
        if candidate.exists() {
            log::warn!("Filename mismatch auto-corrected: {} -> {}", name, file_name(&candidate));
            return Ok(candidate);
        }
    } else if name.ends_with(".zip") {
        let candidate = input.with_file_name(format!("{}-SLC.zip", name.trim_end_matches(".zip")));
        if candidate.exists() {
            log::warn!("Filename mismatch auto-corrected: {} -> {}", name, file_name(&candidate));
            return Ok(candidate);
        }
    }

    Err(InsarError::Configuration(format!(
        "scene file not found (probed -SLC variants): {}",
        input.display()
    )))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string()
}

fn create_symlink(src: &Path, link: &Path) -> InsarResult<()> {
    if link.symlink_metadata().is_ok() {
        std::fs::remove_file(link)?;
    }
    #[cfg(unix)]
    std::os::unix::fs::symlink(src, link)?;
    #[cfg(not(unix))]
    {
        std::fs::copy(src, link)?;
    }
    Ok(())
}

fn xml_err<E: std::fmt::Display>(e: E) -> InsarError {
    InsarError::Configuration(format!("XML write error: {}", e))
}

fn build_topsapp_xml(
    reference: &Path,
    secondary: &Path,
    orbit: &OrbitStatus,
    roi: Option<BoundingBox>,
    options: &ConfigOptions,
) -> InsarResult<Vec<u8>> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
        .map_err(xml_err)?;

    writer
        .write_event(Event::Start(BytesStart::new("topsApp")))
        .map_err(xml_err)?;

    let mut topsinsar = BytesStart::new("component");
    topsinsar.push_attribute(("name", "topsinsar"));
    writer.write_event(Event::Start(topsinsar)).map_err(xml_err)?;

    for (component_name, path) in [("reference", reference), ("secondary", secondary)] {
        let mut component = BytesStart::new("component");
        component.push_attribute(("name", component_name));
        writer.write_event(Event::Start(component)).map_err(xml_err)?;

        write_property(&mut writer, "safe", &format!("['{}']", path.display()))?;
        write_property(&mut writer, "output directory", component_name)?;
        write_property(&mut writer, "orbit directory", &orbit.orbit_dir.display().to_string())?;
        write_property(
            &mut writer,
            "auxiliary data directory",
            &orbit.aux_dir.display().to_string(),
        )?;

        writer
            .write_event(Event::End(BytesEnd::new("component")))
            .map_err(xml_err)?;
    }

    write_property(&mut writer, "dem filename", "dem.wgs84")?;

    if let Some(bbox) = roi {
        let snwe = bbox.to_snwe();
        write_property(
            &mut writer,
            "region of interest",
            &format!("[{:.6}, {:.6}, {:.6}, {:.6}]", snwe[0], snwe[1], snwe[2], snwe[3]),
        )?;
    }

    let swaths = options
        .swaths
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    write_property(&mut writer, "swaths", &format!("[{}]", swaths))?;
    write_property(&mut writer, "do unwrap", "True")?;
    write_property(&mut writer, "unwrapper name", &options.unwrapper.to_string())?;

    if options.use_gpu {
        write_property(&mut writer, "useGPU", "True")?;
    }

    let geocode = GEOCODE_LIST
        .iter()
        .map(|p| format!("'{}'", p))
        .collect::<Vec<_>>()
        .join(", ");
    write_property(&mut writer, "geocode list", &format!("[{}]", geocode))?;

    writer
        .write_event(Event::End(BytesEnd::new("component")))
        .map_err(xml_err)?;
    writer
        .write_event(Event::End(BytesEnd::new("topsApp")))
        .map_err(xml_err)?;

    Ok(writer.into_inner())
}

fn write_property<W: std::io::Write>(
    writer: &mut Writer<W>,
    name: &str,
    value: &str,
) -> InsarResult<()> {
    let mut property = BytesStart::new("property");
    property.push_attribute(("name", name));
    writer.write_event(Event::Start(property)).map_err(xml_err)?;
    writer
        .write_event(Event::Start(BytesStart::new("value")))
        .map_err(xml_err)?;
    writer
        .write_event(Event::Text(BytesText::new(value)))
        .map_err(xml_err)?;
    writer
        .write_event(Event::End(BytesEnd::new("value")))
        .map_err(xml_err)?;
    writer
        .write_event(Event::End(BytesEnd::new("property")))
        .map_err(xml_err)?;
    Ok(())
}
