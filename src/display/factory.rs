/*
 *  display/factory.rs
 *
 *  inkplay - playlist driven e-paper refresh
 *  (c) 2020-26 Stuart Hunter
 *
 *  Driver registry: display type string to driver constructor
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use glob::Pattern;
use log::{debug, info};

use crate::config::DisplayConfig;
use crate::display::drivers::mock::MockDriver;
use crate::display::error::{DisplayError, DisplayFactoryError};
use crate::display::traits::DisplayDriver;

/// Type alias for boxed display driver trait objects
pub type BoxedDriver = Box<dyn DisplayDriver>;

/// Builds a driver for a matched display type
pub type DriverConstructor = Box<dyn Fn(&DisplayConfig) -> Result<BoxedDriver, DisplayError> + Send + Sync>;

/// How a registry entry recognises a display type string
#[derive(Debug, Clone)]
pub enum DriverMatcher {
    Exact(String),
    Glob(Pattern),
}

impl DriverMatcher {
    pub fn exact(name: &str) -> Self {
        DriverMatcher::Exact(name.to_string())
    }

    /// fnmatch style pattern, e.g. `epd*in*`
    pub fn glob(pattern: &str) -> Result<Self, DisplayFactoryError> {
        Pattern::new(pattern)
            .map(DriverMatcher::Glob)
            .map_err(|e| DisplayFactoryError::Unsupported(format!("bad pattern {}: {}", pattern, e)))
    }

    pub fn matches(&self, display_type: &str) -> bool {
        match self {
            DriverMatcher::Exact(name) => name == display_type,
            DriverMatcher::Glob(pattern) => pattern.matches(display_type),
        }
    }
}

struct DriverEntry {
    matcher: DriverMatcher,
    family: &'static str,
    constructor: DriverConstructor,
}

/// Ordered table of (matcher, constructor) pairs. First match wins.
///
/// Families whose hardware support is not compiled in are simply never
/// registered, so an unavailable driver looks exactly like an unknown one.
#[derive(Default)]
pub struct DriverRegistry {
    entries: Vec<DriverEntry>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry; evaluation follows registration order.
    pub fn register<F>(mut self, matcher: DriverMatcher, family: &'static str, constructor: F) -> Self
    where
        F: Fn(&DisplayConfig) -> Result<BoxedDriver, DisplayError> + Send + Sync + 'static,
    {
        self.entries.push(DriverEntry { matcher, family, constructor: Box::new(constructor) });
        self
    }

    /// The built-in table: exact "mock", exact "inky", glob "epd*in*".
    #[allow(unused_mut)]
    pub fn builtin() -> Self {
        let mut registry = Self::new().register(DriverMatcher::exact("mock"), "mock", |cfg| {
            Ok(Box::new(MockDriver::new(cfg)?) as BoxedDriver)
        });

        #[cfg(feature = "driver-inky")]
        {
            registry = registry.register(DriverMatcher::exact("inky"), "inky", |cfg| {
                Ok(Box::new(crate::display::drivers::inky::open(cfg)?) as BoxedDriver)
            });
        }

        // derived from the waveshare epd naming; a vendor + model split in
        // the config would be needed if that convention ever breaks
        #[cfg(feature = "driver-waveshare")]
        match DriverMatcher::glob("epd*in*") {
            Ok(matcher) => {
                registry = registry.register(matcher, "waveshare", |cfg| {
                    Ok(Box::new(crate::display::drivers::waveshare::open(cfg)?) as BoxedDriver)
                });
            }
            Err(e) => log::error!("waveshare family disabled: {}", e),
        }

        registry
    }

    /// Family name of the first entry matching `display_type`
    pub fn family_for(&self, display_type: &str) -> Option<&'static str> {
        self.entries
            .iter()
            .find(|e| e.matcher.matches(display_type))
            .map(|e| e.family)
    }

    pub fn families(&self) -> Vec<&'static str> {
        self.entries.iter().map(|e| e.family).collect()
    }

    /// Create the driver for `config.display_type`
    pub fn create(&self, config: &DisplayConfig) -> Result<BoxedDriver, DisplayFactoryError> {
        let display_type = config.display_type.as_str();
        let entry = self
            .entries
            .iter()
            .find(|e| e.matcher.matches(display_type))
            .ok_or_else(|| {
                debug!("no driver among {:?} matches {}", self.families(), display_type);
                DisplayFactoryError::Unsupported(display_type.to_string())
            })?;

        info!("Display type {} resolved to the {} driver", display_type, entry.family);
        Ok((entry.constructor)(config)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting(counter: Arc<AtomicUsize>) -> impl Fn(&DisplayConfig) -> Result<BoxedDriver, DisplayError> {
        move |cfg| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(MockDriver::in_memory(cfg.width, cfg.height)) as BoxedDriver)
        }
    }

    fn config(display_type: &str) -> DisplayConfig {
        DisplayConfig { display_type: display_type.to_string(), ..Default::default() }
    }

    #[test]
    fn test_glob_matcher() {
        let m = DriverMatcher::glob("epd*in*").unwrap();
        assert!(m.matches("epd7in5"));
        assert!(m.matches("epd7in5_V2"));
        assert!(m.matches("epd2in13b"));
        assert!(!m.matches("inky"));
        assert!(!m.matches("banana"));
    }

    #[test]
    fn test_first_match_wins() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let registry = DriverRegistry::new()
            .register(DriverMatcher::exact("epd7in5"), "special", counting(first.clone()))
            .register(DriverMatcher::glob("epd*in*").unwrap(), "family", counting(second.clone()));

        registry.create(&config("epd7in5")).unwrap();
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 0);

        registry.create(&config("epd4in2")).unwrap();
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unknown_type_is_unsupported() {
        let called = Arc::new(AtomicUsize::new(0));
        let registry = DriverRegistry::new().register(DriverMatcher::exact("mock"), "mock", counting(called.clone()));
        let err = registry.create(&config("banana")).err().unwrap();
        assert!(matches!(err, DisplayFactoryError::Unsupported(ref t) if t == "banana"));
        assert_eq!(called.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_builtin_order() {
        let registry = DriverRegistry::builtin();
        assert_eq!(registry.families()[0], "mock");
        assert_eq!(registry.family_for("mock"), Some("mock"));
        assert_eq!(registry.family_for("banana"), None);
        #[cfg(feature = "driver-inky")]
        assert_eq!(registry.family_for("inky"), Some("inky"));
        #[cfg(feature = "driver-waveshare")]
        assert_eq!(registry.family_for("epd7in5"), Some("waveshare"));
    }
}
