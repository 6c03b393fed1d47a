use crate::imports::*;
use std::collections::BTreeMap;

/// Serialization formats understood by [SerdeAPI], keyed by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFormat {
    Yaml,
    Json,
    Bincode,
}

impl DataFormat {
    pub fn from_extension(ext: &str) -> anyhow::Result<Self> {
        match ext.trim_start_matches('.').to_lowercase().as_str() {
            "yaml" | "yml" => Ok(Self::Yaml),
            "json" => Ok(Self::Json),
            "bin" => Ok(Self::Bincode),
            other => bail!("unsupported format {other:?}: expected yaml, yml, json or bin"),
        }
    }

    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let ext = path
            .extension()
            .and_then(OsStr::to_str)
            .with_context(|| format!("no usable file extension on {path:?}"))?;
        Self::from_extension(ext)
    }
}

/// File and string (de)serialization shared by every configuration and
/// result type. Anything deserialized passes through [SerdeAPI::init].
pub trait SerdeAPI: Serialize + for<'a> Deserialize<'a> {
    /// Validation run after every deserialization
    fn init(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Reads `path`, relative to the `resources` folder bundled with the crate
    #[cfg(feature = "resources")]
    fn from_resource<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let format = DataFormat::from_path(path)?;
        let file = crate::resources::RESOURCES_DIR
            .get_file(path)
            .with_context(|| format!("no bundled resource at {path:?}"))?;
        Self::from_reader(file.contents(), format)
    }

    /// Reads a file whose format follows its extension
    fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let format = DataFormat::from_path(path)?;
        let file = File::open(path).with_context(|| format!("could not open {path:?}"))?;
        Self::from_reader(file, format)
    }

    /// Writes a file whose format follows its extension, truncating any
    /// existing file
    fn to_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let path = path.as_ref();
        let format = DataFormat::from_path(path)?;
        let file = File::create(path).with_context(|| format!("could not create {path:?}"))?;
        let mut wtr = std::io::BufWriter::new(file);
        self.to_writer(&mut wtr, format)?;
        std::io::Write::flush(&mut wtr)?;
        Ok(())
    }

    fn from_reader<R: std::io::Read>(rdr: R, format: DataFormat) -> anyhow::Result<Self> {
        let mut value: Self = match format {
            DataFormat::Yaml => serde_yaml::from_reader(rdr)?,
            DataFormat::Json => serde_json::from_reader(rdr)?,
            DataFormat::Bincode => bincode::deserialize_from(rdr)?,
        };
        value.init()?;
        Ok(value)
    }

    fn to_writer<W: std::io::Write>(&self, wtr: W, format: DataFormat) -> anyhow::Result<()> {
        match format {
            DataFormat::Yaml => serde_yaml::to_writer(wtr, self)?,
            DataFormat::Json => serde_json::to_writer(wtr, self)?,
            DataFormat::Bincode => bincode::serialize_into(wtr, self)?,
        }
        Ok(())
    }

    /// Serializes to a text format, `yaml` or `json`
    fn to_str(&self, format: &str) -> anyhow::Result<String> {
        match DataFormat::from_extension(format)? {
            DataFormat::Yaml => self.to_yaml(),
            DataFormat::Json => self.to_json(),
            DataFormat::Bincode => bail!("bincode is not a text format"),
        }
    }

    fn from_str<S: AsRef<str>>(contents: S, format: &str) -> anyhow::Result<Self> {
        match DataFormat::from_extension(format)? {
            DataFormat::Bincode => bail!("bincode is not a text format"),
            text => Self::from_reader(contents.as_ref().as_bytes(), text),
        }
    }

    fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string(&self)?)
    }

    fn from_json<S: AsRef<str>>(json: S) -> anyhow::Result<Self> {
        Self::from_reader(json.as_ref().as_bytes(), DataFormat::Json)
    }

    fn to_yaml(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(&self)?)
    }

    fn from_yaml<S: AsRef<str>>(yaml: S) -> anyhow::Result<Self> {
        Self::from_reader(yaml.as_ref().as_bytes(), DataFormat::Yaml)
    }

    fn to_bincode(&self) -> anyhow::Result<Vec<u8>> {
        Ok(bincode::serialize(&self)?)
    }

    fn from_bincode(encoded: &[u8]) -> anyhow::Result<Self> {
        Self::from_reader(encoded, DataFormat::Bincode)
    }
}

pub trait ApproxEq<Rhs = Self> {
    fn approx_eq(&self, other: &Rhs, tol: f64) -> bool;
}

macro_rules! impl_approx_eq_for_strict_eq_types {
    ($($strict_eq_type: ty),*) => {
        $(
            impl ApproxEq for $strict_eq_type {
                fn approx_eq(&self, other: &$strict_eq_type, _tol: f64) -> bool {
                    self == other
                }
            }
        )*
    }
}

impl_approx_eq_for_strict_eq_types!(u8, u32, u64, usize, i32, i64, bool, &str, String, Segment);

macro_rules! impl_approx_eq_for_floats {
    ($($float_type: ty),*) => {
        $(
            impl ApproxEq for $float_type {
                fn approx_eq(&self, other: &$float_type, tol: f64) -> bool {
                    (((other - self) / (self + other)).abs() as f64) < tol || ((other - self).abs() as f64) < tol
                }
            }
        )*
    }
}

impl_approx_eq_for_floats!(f32, f64);

impl<T> ApproxEq for Vec<T>
where
    T: ApproxEq,
{
    fn approx_eq(&self, other: &Vec<T>, tol: f64) -> bool {
        self.len() == other.len() && self.iter().zip(other.iter()).all(|(x, y)| x.approx_eq(y, tol))
    }
}

impl<T, const N: usize> ApproxEq for [T; N]
where
    T: ApproxEq,
{
    fn approx_eq(&self, other: &[T; N], tol: f64) -> bool {
        self.iter().zip(other.iter()).all(|(x, y)| x.approx_eq(y, tol))
    }
}

impl<T> ApproxEq for Array1<T>
where
    T: ApproxEq,
{
    fn approx_eq(&self, other: &Array1<T>, tol: f64) -> bool {
        self.len() == other.len() && self.iter().zip(other.iter()).all(|(x, y)| x.approx_eq(y, tol))
    }
}

impl<T> ApproxEq for Array2<T>
where
    T: ApproxEq,
{
    fn approx_eq(&self, other: &Array2<T>, tol: f64) -> bool {
        self.dim() == other.dim() && self.iter().zip(other.iter()).all(|(x, y)| x.approx_eq(y, tol))
    }
}

impl<T> ApproxEq for Option<T>
where
    T: ApproxEq,
{
    fn approx_eq(&self, other: &Option<T>, tol: f64) -> bool {
        match (self, other) {
            (None, None) => true,
            (Some(a), Some(b)) => a.approx_eq(b, tol),
            _ => false,
        }
    }
}

impl<K, V> ApproxEq for BTreeMap<K, V>
where
    K: Ord,
    V: ApproxEq,
{
    fn approx_eq(&self, other: &BTreeMap<K, V>, tol: f64) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(key, value)| other.get(key).map_or(false, |v| value.approx_eq(v, tol)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comfort::ComfortParams;

    #[test]
    fn test_format_follows_extension() {
        assert_eq!(DataFormat::from_extension(".YML").unwrap(), DataFormat::Yaml);
        assert_eq!(
            DataFormat::from_path(Path::new("trace.bin")).unwrap(),
            DataFormat::Bincode
        );
        assert!(DataFormat::from_extension("csv").is_err());
        assert!(DataFormat::from_path(Path::new("no_extension")).is_err());
        let params = ComfortParams::default();
        let yaml = params.to_str("yaml").unwrap();
        assert_eq!(ComfortParams::from_str(yaml, "yml").unwrap(), params);
        assert!(params.to_str("bin").is_err());
    }

    #[test]
    fn test_file_round_trip_runs_init() {
        let dir = tempfile::tempdir().unwrap();
        let params = ComfortParams {
            clothing_insulation: 0.155,
            ..Default::default()
        };
        for name in ["params.yaml", "params.json", "params.bin"] {
            let path = dir.path().join(name);
            params.to_file(&path).unwrap();
            assert_eq!(ComfortParams::from_file(&path).unwrap(), params);
        }
        let invalid = ComfortParams {
            external_work: -1.0,
            ..Default::default()
        };
        let path = dir.path().join("invalid.json");
        invalid.to_file(&path).unwrap();
        assert!(ComfortParams::from_file(&path).is_err());
    }

    #[test]
    fn test_float_approx_eq_is_relative_for_large_values() {
        assert!(1.0e6_f64.approx_eq(&(1.0e6 + 1.0), 1e-5));
        assert!(!1.0_f64.approx_eq(&1.1, 1e-5));
    }

    #[test]
    fn test_arrays_of_different_shape_are_not_approx_eq() {
        let a = Array2::<f64>::zeros((2, 3));
        let b = Array2::<f64>::zeros((3, 2));
        assert!(!a.approx_eq(&b, 1e-9));
        assert!(a.approx_eq(&a.clone(), 1e-9));
    }

    #[test]
    fn test_option_approx_eq() {
        assert!(Some(2.0_f64).approx_eq(&Some(2.0 + 1e-12), 1e-9));
        assert!(!Some(2.0_f64).approx_eq(&None, 1e-9));
    }
}
