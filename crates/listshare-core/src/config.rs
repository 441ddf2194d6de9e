use std::collections::HashMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};
use std::str::FromStr;

use anyhow::{
  Context,
  anyhow,
  bail
};
use tokio::time::Duration;
use tracing::{
  debug,
  info,
  trace,
  warn
};
use url::Url;

use crate::messages::Locale;

const DEFAULTS: &[(&str, &str)] = &[
  ("api.base", "http://localhost:8100"),
  ("data.location", "~/.listshare"),
  ("recents.capacity", "20"),
  ("recents.preview", "3"),
  ("suggest.debounce_ms", "150"),
  ("suggest.min_chars", "2"),
  ("hint.idle_ms", "5000"),
  ("popular.limit", "20"),
  ("popular.shown", "12"),
  ("ui.locale", "uk"),
  ("color", "on")
];

/// Raw `key = value` pairs layered over
/// the built-in defaults.
#[derive(Debug, Clone, Default)]
pub struct Config {
  values: HashMap<String, String>
}

impl Config {
  #[tracing::instrument(skip(
    rc_override
  ))]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::default();
    let Some(path) =
      resolve_rc_path(rc_override)
    else {
      warn!(
        "no listsharerc found; using \
         defaults"
      );
      return Ok(cfg);
    };

    info!(rc = %path.display(), "loading listsharerc");
    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;
    cfg.values = parse_rc(
      &text,
      &path.display().to_string()
    )?;
    Ok(cfg)
  }

  /// Later pairs win. An `rc.` prefix
  /// is accepted and dropped.
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (key, value) in overrides {
      let key = key
        .strip_prefix("rc.")
        .map_or(key.clone(), str::to_string);
      debug!(%key, %value, "applying override");
      self.values.insert(key, value);
    }
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<&str> {
    self
      .values
      .get(key)
      .map(String::as_str)
      .or_else(|| {
        DEFAULTS
          .iter()
          .find(|(k, _)| *k == key)
          .map(|(_, v)| *v)
      })
  }

  fn parsed<T>(
    &self,
    key: &str
  ) -> anyhow::Result<T>
  where
    T: FromStr,
    T::Err: std::fmt::Display
  {
    let raw = self
      .get(key)
      .ok_or_else(|| {
        anyhow!(
          "missing config key {key}"
        )
      })?
      .trim();
    raw.parse::<T>().map_err(|err| {
      anyhow!(
        "invalid value for {key}: \
         {raw:?} ({err})"
      )
    })
  }

  fn switch(
    &self,
    key: &str
  ) -> anyhow::Result<bool> {
    let raw = self
      .get(key)
      .unwrap_or_default()
      .trim()
      .to_ascii_lowercase();
    match raw.as_str() {
      "on" | "yes" | "true" | "1" => {
        Ok(true)
      }
      "off" | "no" | "false" | "0" => {
        Ok(false)
      }
      _ => {
        bail!(
          "invalid value for {key}: \
           {raw:?} (expected on or off)"
        )
      }
    }
  }
}

/// Reads `key = value` lines. Blank
/// lines and `#` comments, whole-line or
/// trailing, are skipped.
fn parse_rc(
  text: &str,
  origin: &str
) -> anyhow::Result<HashMap<String, String>>
{
  let mut values = HashMap::new();
  for (idx, raw_line) in
    text.lines().enumerate()
  {
    let line = raw_line
      .split_once('#')
      .map_or(raw_line, |(before, _)| {
        before
      })
      .trim();
    if line.is_empty() {
      continue;
    }

    let Some((key, value)) =
      line.split_once('=')
    else {
      bail!(
        "invalid config line \
         {origin}:{}: {raw_line}",
        idx + 1
      );
    };
    let key = key.trim();
    if key.is_empty() {
      bail!(
        "missing key on config line \
         {origin}:{}",
        idx + 1
      );
    }
    trace!(key, value = value.trim(), "loaded config key");
    values.insert(
      key.to_string(),
      value.trim().to_string()
    );
  }
  Ok(values)
}

/// Typed view of the keys the sync
/// engine reads.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
  pub api_base:         Url,
  pub recents_capacity: usize,
  pub recents_preview:  usize,
  pub debounce:         Duration,
  pub min_chars:        usize,
  pub idle_hint:        Duration,
  pub popular_limit:    usize,
  pub popular_shown:    usize,
  pub locale:           Locale,
  pub color:            bool
}

impl Settings {
  #[tracing::instrument(skip(cfg))]
  pub fn from_config(
    cfg: &Config
  ) -> anyhow::Result<Self> {
    let api_base: Url =
      cfg.parsed("api.base")?;
    if api_base.cannot_be_a_base() {
      bail!(
        "api.base must be an absolute \
         http(s) url: {api_base}"
      );
    }

    let recents_capacity: usize =
      cfg.parsed("recents.capacity")?;
    if recents_capacity == 0 {
      bail!(
        "recents.capacity must be at \
         least 1"
      );
    }

    Ok(Self {
      api_base,
      recents_capacity,
      recents_preview: cfg
        .parsed("recents.preview")?,
      debounce: Duration::from_millis(
        cfg.parsed(
          "suggest.debounce_ms"
        )?
      ),
      min_chars: cfg
        .parsed("suggest.min_chars")?,
      idle_hint: Duration::from_millis(
        cfg.parsed("hint.idle_ms")?
      ),
      popular_limit: cfg
        .parsed("popular.limit")?,
      popular_shown: cfg
        .parsed("popular.shown")?,
      locale: cfg.parsed("ui.locale")?,
      color: cfg.switch("color")?
    })
  }
}

/// `--data` wins over `data.location`.
/// The directory is created if missing.
#[tracing::instrument(skip(
  cfg,
  override_dir
))]
pub fn resolve_data_dir(
  cfg: &Config,
  override_dir: Option<&Path>
) -> anyhow::Result<PathBuf> {
  let dir = match override_dir {
    Some(path) => path.to_path_buf(),
    None => {
      let location = cfg
        .get("data.location")
        .unwrap_or_default();
      expand_home(location)?
    }
  };

  if !dir.exists() {
    info!(dir = %dir.display(), "creating data directory");
    fs::create_dir_all(&dir)
      .with_context(|| {
        format!(
          "failed to create {}",
          dir.display()
        )
      })?;
  }
  Ok(dir)
}

fn resolve_rc_path(
  override_path: Option<&Path>
) -> Option<PathBuf> {
  if let Some(path) = override_path {
    return Some(path.to_path_buf());
  }

  if let Ok(rc_env) =
    std::env::var("LISTSHARERC")
  {
    return (rc_env != "/dev/null")
      .then(|| PathBuf::from(rc_env));
  }

  let candidate = dirs::home_dir()?
    .join(".listsharerc");
  candidate
    .exists()
    .then_some(candidate)
}

fn expand_home(
  location: &str
) -> anyhow::Result<PathBuf> {
  let Some(rest) =
    location.strip_prefix("~/")
  else {
    return Ok(PathBuf::from(location));
  };
  let home = dirs::home_dir()
    .ok_or_else(|| {
      anyhow!(
        "cannot determine home \
         directory for {location}"
      )
    })?;
  Ok(home.join(rest))
}

#[cfg(test)]
mod tests {
  use tempfile::tempdir;

  use super::*;

  fn with(
    pairs: &[(&str, &str)]
  ) -> Config {
    let mut cfg = Config::default();
    cfg.apply_overrides(
      pairs.iter().map(|(k, v)| {
        (k.to_string(), v.to_string())
      })
    );
    cfg
  }

  #[test]
  fn defaults_match_the_documented_keys()
  {
    let settings = Settings::from_config(
      &Config::default()
    )
    .unwrap();
    assert_eq!(
      settings.api_base.as_str(),
      "http://localhost:8100/"
    );
    assert_eq!(settings.recents_capacity, 20);
    assert_eq!(settings.recents_preview, 3);
    assert_eq!(
      settings.debounce,
      Duration::from_millis(150)
    );
    assert_eq!(settings.min_chars, 2);
    assert_eq!(
      settings.idle_hint,
      Duration::from_secs(5)
    );
    assert_eq!(settings.popular_shown, 12);
    assert_eq!(settings.locale, Locale::Uk);
    assert!(settings.color);
  }

  #[test]
  fn rc_file_then_overrides() {
    let temp = tempdir().unwrap();
    let rc = temp.path().join("main.rc");
    fs::write(
      &rc,
      "# comment\n\napi.base = https://lists.example.org  # trailing\nui.locale=en\nrecents.capacity = 9\n"
    )
    .unwrap();

    let mut cfg =
      Config::load(Some(rc.as_path())).unwrap();
    cfg.apply_overrides([(
      "rc.recents.capacity".to_string(),
      "5".to_string()
    )]);
    let settings =
      Settings::from_config(&cfg).unwrap();

    assert_eq!(
      settings.api_base.as_str(),
      "https://lists.example.org/"
    );
    assert_eq!(settings.locale, Locale::En);
    assert_eq!(settings.recents_capacity, 5);
    assert_eq!(
      settings.idle_hint,
      Duration::from_secs(5)
    );
  }

  #[test]
  fn bad_values_name_the_key() {
    let err = Settings::from_config(
      &with(&[(
        "suggest.debounce_ms",
        "soon"
      )])
    )
    .unwrap_err()
    .to_string();
    assert!(
      err.contains("suggest.debounce_ms"),
      "{err}"
    );

    let err = Settings::from_config(
      &with(&[("color", "maybe")])
    )
    .unwrap_err()
    .to_string();
    assert!(err.contains("color"), "{err}");

    assert!(
      Settings::from_config(&with(&[(
        "recents.capacity",
        "0"
      )]))
      .is_err()
    );
  }

  #[test]
  fn color_switch_accepts_off() {
    let settings = Settings::from_config(
      &with(&[("color", " OFF ")])
    )
    .unwrap();
    assert!(!settings.color);
  }

  #[test]
  fn malformed_rc_lines_are_errors() {
    let err = parse_rc(
      "api.base = x\njust words\n",
      "bad.rc"
    )
    .unwrap_err()
    .to_string();
    assert!(err.contains("bad.rc:2"), "{err}");
    assert!(
      parse_rc("= value", "bad.rc").is_err()
    );
  }

  #[test]
  fn data_dir_override_is_created() {
    let temp = tempdir().unwrap();
    let wanted = temp.path().join("nested/data");
    let dir = resolve_data_dir(
      &Config::default(),
      Some(wanted.as_path())
    )
    .unwrap();
    assert_eq!(dir, wanted);
    assert!(dir.is_dir());

    let from_cfg = temp.path().join("cfg");
    let cfg = with(&[(
      "data.location",
      from_cfg.to_str().unwrap()
    )]);
    assert_eq!(
      resolve_data_dir(&cfg, None).unwrap(),
      from_cfg
    );
  }
}
