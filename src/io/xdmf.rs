//! XDMF descriptor sidecar for a checkpoint.
//!
//! The sidecar lets visualization tools read the container as a rectilinear
//! grid: a `3DRectMesh` topology, `VxVyVz` geometry pointing at the mesh
//! datasets and one cell-centred attribute pointing at `data`. It is derived
//! data and never read back by restore.

use crate::checkpoint_error::CheckpointError;
use crate::io::{CollectiveContainer, DataLocator, DatasetInfo};
use std::io::Write;
use std::path::Path;

/// One `DataItem`: its dimensions, element width and where the values live.
#[derive(Clone, Debug, PartialEq)]
pub struct DataRef {
    pub dims: Vec<u64>,
    /// Bytes per element.
    pub precision: usize,
    pub locator: DataLocator,
}

impl DataRef {
    pub fn from_dataset<H: CollectiveContainer>(handle: &H, info: &DatasetInfo) -> Self {
        Self {
            dims: info.shape.clone(),
            precision: info.kind.width(),
            locator: handle.locate(info),
        }
    }

    fn dims_string(&self) -> String {
        self.dims
            .iter()
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Everything the sidecar says about one checkpoint.
#[derive(Clone, Debug, PartialEq)]
pub struct XdmfDescriptor {
    pub time: f64,
    /// `AttributeType` of the data attribute (`Scalar`, `Vector`, ...).
    pub attribute: String,
    /// Vertex coordinate datasets along x, y, z.
    pub mesh: [DataRef; 3],
    pub data: DataRef,
}

impl XdmfDescriptor {
    /// Vertex counts in topology order: z, y, x.
    pub fn topology_dims(&self) -> [u64; 3] {
        let n = |a: usize| self.mesh[a].dims.first().copied().unwrap_or(0);
        [n(2), n(1), n(0)]
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<(), CheckpointError> {
        let [tz, ty, tx] = self.topology_dims();
        writeln!(writer, "<?xml version=\"1.0\" ?>")?;
        writeln!(writer, "<!DOCTYPE Xdmf SYSTEM \"Xdmf.dtd\" []>")?;
        writeln!(writer, "<Xdmf Version=\"2.0\">")?;
        writeln!(writer, " <Domain>")?;
        writeln!(writer, "   <Grid GridType=\"Uniform\">")?;
        writeln!(writer, "     <Time Value=\"{}\"/>", format_scientific(self.time))?;
        writeln!(writer)?;
        writeln!(
            writer,
            "     <Topology TopologyType=\"3DRectMesh\" Dimensions=\"{tz} {ty} {tx}\"/>"
        )?;
        writeln!(writer)?;
        writeln!(writer, "     <Geometry GeometryType=\"VxVyVz\">")?;
        for (name, item) in ["mesh_vx", "mesh_vy", "mesh_vz"].iter().zip(&self.mesh) {
            write_data_item(writer, Some(name), item)?;
        }
        writeln!(writer, "     </Geometry>")?;
        writeln!(writer)?;
        writeln!(
            writer,
            "     <Attribute Name=\"data\" AttributeType=\"{}\" Center=\"Cell\">",
            escape(&self.attribute)
        )?;
        write_data_item(writer, None, &self.data)?;
        writeln!(writer, "     </Attribute>")?;
        writeln!(writer, "   </Grid>")?;
        writeln!(writer, " </Domain>")?;
        writeln!(writer, "</Xdmf>")?;
        Ok(())
    }

    pub fn to_xml_string(&self) -> Result<String, CheckpointError> {
        let mut out = Vec::new();
        self.write(&mut out)?;
        String::from_utf8(out).map_err(|e| CheckpointError::Format(e.to_string()))
    }

    /// Write the sidecar to `path`, replacing any previous one.
    pub fn write_file(&self, path: &Path) -> Result<(), CheckpointError> {
        let mut file = std::io::BufWriter::new(std::fs::File::create(path)?);
        self.write(&mut file)?;
        file.flush()?;
        Ok(())
    }
}

fn write_data_item<W: Write>(
    writer: &mut W,
    name: Option<&str>,
    item: &DataRef,
) -> Result<(), CheckpointError> {
    let name = name.map(|n| format!("Name=\"{n}\" ")).unwrap_or_default();
    let dims = item.dims_string();
    let precision = item.precision;
    match &item.locator {
        DataLocator::Hdf { file, path } => {
            writeln!(
                writer,
                "       <DataItem {name}Dimensions=\"{dims}\" NumberType=\"Float\" Precision=\"{precision}\" Format=\"HDF\">"
            )?;
            writeln!(writer, "        {}:{}", escape(file), escape(path))?;
        }
        DataLocator::Binary { file, seek, endian } => {
            writeln!(
                writer,
                "       <DataItem {name}Dimensions=\"{dims}\" NumberType=\"Float\" Precision=\"{precision}\" Format=\"Binary\" Endian=\"{}\" Seek=\"{seek}\">",
                endian.as_str()
            )?;
            writeln!(writer, "        {}", escape(file))?;
        }
    }
    writeln!(writer, "       </DataItem>")?;
    Ok(())
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

/// `value` in C `%e` notation: six fractional digits and a signed exponent
/// of at least two digits, e.g. `1.500000e-03`.
pub fn format_scientific(value: f64) -> String {
    if value.is_nan() {
        return "nan".into();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf".into() } else { "-inf".into() };
    }
    let s = format!("{value:.6e}");
    match s.split_once('e') {
        Some((mantissa, exp)) => {
            let exp: i32 = exp.parse().unwrap_or(0);
            let sign = if exp < 0 { '-' } else { '+' };
            format!("{mantissa}e{sign}{:02}", exp.abs())
        }
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::Endian;

    #[test]
    fn scientific_matches_c_printf() {
        assert_eq!(format_scientific(0.0), "0.000000e+00");
        assert_eq!(format_scientific(1.5), "1.500000e+00");
        assert_eq!(format_scientific(0.0015), "1.500000e-03");
        assert_eq!(format_scientific(-123456.0), "-1.234560e+05");
        assert_eq!(format_scientific(1.0e150), "1.000000e+150");
    }

    fn hdf(path: &str, dims: Vec<u64>, precision: usize) -> DataRef {
        DataRef {
            dims,
            precision,
            locator: DataLocator::Hdf {
                file: "run.h5".into(),
                path: path.into(),
            },
        }
    }

    #[test]
    fn hdf_references_follow_classic_layout() {
        let d = XdmfDescriptor {
            time: 0.25,
            attribute: "Scalar".into(),
            mesh: [
                hdf("/vx", vec![17], 8),
                hdf("/vy", vec![9], 8),
                hdf("/vz", vec![5], 8),
            ],
            data: hdf("/data", vec![4, 8, 16, 1], 4),
        };
        let xml = d.to_xml_string().unwrap();
        assert!(xml.contains("     <Time Value=\"2.500000e-01\"/>\n"));
        assert!(xml.contains("Dimensions=\"5 9 17\""));
        assert!(xml.contains(
            "       <DataItem Name=\"mesh_vy\" Dimensions=\"9\" NumberType=\"Float\" Precision=\"8\" Format=\"HDF\">\n        run.h5:/vy\n"
        ));
        assert!(xml.contains(
            "<DataItem Dimensions=\"4 8 16 1\" NumberType=\"Float\" Precision=\"4\" Format=\"HDF\">"
        ));
        assert!(xml.ends_with("</Xdmf>\n"));
    }

    #[test]
    fn binary_references_carry_seek_and_endian() {
        let bin = |seek| DataRef {
            dims: vec![3],
            precision: 8,
            locator: DataLocator::Binary {
                file: "a&b.ckpt".into(),
                seek,
                endian: Endian::Little,
            },
        };
        let d = XdmfDescriptor {
            time: 1.0,
            attribute: "Vector".into(),
            mesh: [bin(2112), bin(2176), bin(2240)],
            data: bin(2304),
        };
        let xml = d.to_xml_string().unwrap();
        assert!(xml.contains("Format=\"Binary\" Endian=\"Little\" Seek=\"2176\">"));
        assert!(xml.contains("        a&amp;b.ckpt\n"));
        assert!(xml.contains("AttributeType=\"Vector\""));
    }
}
