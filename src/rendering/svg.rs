use anyhow::{Context, Result};
use resvg::tiny_skia::{Pixmap, Transform};
use std::path::Path;
use std::sync::Arc;
use usvg::fontdb;

const PREFERRED_SANS: [&str; 5] = [
    "DejaVu Sans",
    "Liberation Sans",
    "Noto Sans",
    "Arial",
    "Helvetica",
];

/// Rasterizes SVG markup (labels, legend, marker) with a shared font database.
#[derive(Clone)]
pub struct SvgRasterizer {
    fontdb: Arc<fontdb::Database>,
}

impl SvgRasterizer {
    pub fn with_system_fonts(fonts_dir: Option<&Path>) -> Self {
        let mut db = fontdb::Database::new();
        db.load_system_fonts();
        if let Some(dir) = fonts_dir {
            db.load_fonts_dir(dir);
        }

        let family = PREFERRED_SANS
            .iter()
            .find(|name| has_family(&db, name))
            .map(|name| name.to_string())
            .or_else(|| {
                db.faces()
                    .next()
                    .and_then(|face| face.families.first())
                    .map(|(name, _)| name.clone())
            });

        match family {
            Some(name) => {
                tracing::debug!("Using '{}' for labels ({} faces loaded)", name, db.len());
                db.set_sans_serif_family(name);
            }
            None => tracing::warn!("No fonts found, labels will not be drawn"),
        }

        Self {
            fontdb: Arc::new(db),
        }
    }

    #[cfg(test)]
    pub fn without_fonts() -> Self {
        Self {
            fontdb: Arc::new(fontdb::Database::new()),
        }
    }

    fn parse(&self, svg: &str) -> Result<usvg::Tree> {
        let opts = usvg::Options {
            fontdb: self.fontdb.clone(),
            ..Default::default()
        };
        usvg::Tree::from_str(svg, &opts).context("parse svg markup")
    }

    /// Draw `svg` over the existing content of `pixmap`, in pixel units.
    pub fn draw(&self, svg: &str, pixmap: &mut Pixmap) -> Result<()> {
        let tree = self.parse(svg)?;
        resvg::render(&tree, Transform::identity(), &mut pixmap.as_mut());
        Ok(())
    }

    pub fn rasterize(&self, svg: &str, width: u32, height: u32) -> Result<Pixmap> {
        let mut pixmap = Pixmap::new(width, height)
            .with_context(|| format!("allocate {width}x{height} pixmap"))?;
        self.draw(svg, &mut pixmap)?;
        Ok(pixmap)
    }
}

fn has_family(db: &fontdb::Database, name: &str) -> bool {
    db.faces()
        .any(|face| face.families.iter().any(|(family, _)| family == name))
}
