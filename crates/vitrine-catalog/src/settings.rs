//! Shop language settings and their resolution.
//!
//! [`ShopSettings`] is always passed explicitly into sync and retrieval
//! calls; nothing in Vitrine caches it. Caching, if any, belongs to the
//! [`SettingsSource`] behind the resolver.
//!
//! A shop with `multi_lang_rag_enabled = false` is single-language: only its
//! default source language is embedded, indexed, or returned.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use vitrine_core::config::CatalogConfig;
use vitrine_core::{Error, Lang, Result, ShopId};

// ============================================================================
// ShopSettings
// ============================================================================

/// Language configuration of one shop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShopSettings {
    /// Shop the settings belong to.
    pub shop: ShopId,

    /// Language content is authored in; the fallback language.
    pub default_source_lang: Lang,

    /// Languages the shop publishes.
    pub enabled_langs: BTreeSet<Lang>,

    /// Feature gate for multi-lingual retrieval.
    #[serde(default)]
    pub multi_lang_rag_enabled: bool,
}

/// Outcome of mapping a requested language onto a shop's settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageResolution {
    /// Language whose partition will be searched.
    pub lang: Lang,

    /// True when `lang` differs from the requested language.
    pub fallback_applied: bool,
}

impl ShopSettings {
    /// Single-language settings: only `default_lang` is enabled, feature off.
    pub fn single_language(shop: ShopId, default_lang: Lang) -> Self {
        Self {
            shop,
            enabled_langs: BTreeSet::from([default_lang.clone()]),
            default_source_lang: default_lang,
            multi_lang_rag_enabled: false,
        }
    }

    /// Multi-language settings with the feature enabled.
    ///
    /// The default language is added to `langs` if missing.
    pub fn multi_language(
        shop: ShopId,
        default_lang: Lang,
        langs: impl IntoIterator<Item = Lang>,
    ) -> Self {
        let mut enabled_langs: BTreeSet<Lang> = langs.into_iter().collect();
        enabled_langs.insert(default_lang.clone());
        Self {
            shop,
            default_source_lang: default_lang,
            enabled_langs,
            multi_lang_rag_enabled: true,
        }
    }

    /// Check the settings invariants.
    pub fn validate(&self) -> Result<()> {
        if self.default_source_lang.as_str().is_empty() {
            return Err(Error::config(format!(
                "shop {}: default source language is empty",
                self.shop
            )));
        }
        if !self.enabled_langs.contains(&self.default_source_lang) {
            return Err(Error::config(format!(
                "shop {}: default source language '{}' is not enabled",
                self.shop, self.default_source_lang
            )));
        }
        Ok(())
    }

    /// The single-language view of these settings.
    pub fn fail_closed(&self) -> Self {
        Self::single_language(self.shop.clone(), self.default_source_lang.clone())
    }

    /// Languages whose content may be embedded, indexed, and returned.
    pub fn effective_languages(&self) -> BTreeSet<Lang> {
        if self.multi_lang_rag_enabled {
            self.enabled_langs.clone()
        } else {
            BTreeSet::from([self.default_source_lang.clone()])
        }
    }

    /// Whether `lang` is one of the effective languages.
    pub fn is_effective(&self, lang: &Lang) -> bool {
        if self.multi_lang_rag_enabled {
            self.enabled_langs.contains(lang)
        } else {
            lang == &self.default_source_lang
        }
    }

    /// Map a requested language to the partition that should serve it.
    pub fn resolve_language(&self, requested: &Lang) -> LanguageResolution {
        if self.is_effective(requested) {
            LanguageResolution {
                lang: requested.clone(),
                fallback_applied: false,
            }
        } else {
            LanguageResolution {
                lang: self.default_source_lang.clone(),
                fallback_applied: true,
            }
        }
    }

    /// Whether sparse results in `resolved` may be topped up from the
    /// default language.
    pub fn fallback_permitted(&self, resolved: &Lang) -> bool {
        self.multi_lang_rag_enabled && resolved != &self.default_source_lang
    }
}

// ============================================================================
// SettingsSource
// ============================================================================

/// The shop-configuration collaborator.
#[async_trait]
pub trait SettingsSource: Send + Sync {
    /// Explicit settings for `shop`, or `None` if the shop has none.
    async fn fetch(&self, shop: &ShopId) -> Result<Option<ShopSettings>>;
}

/// In-memory [`SettingsSource`].
#[derive(Debug, Default)]
pub struct StaticSettingsSource {
    settings: RwLock<HashMap<ShopId, ShopSettings>>,
}

impl StaticSettingsSource {
    /// Create an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store settings, replacing any previous value for the shop.
    pub async fn set(&self, settings: ShopSettings) {
        self.settings
            .write()
            .await
            .insert(settings.shop.clone(), settings);
    }

    /// Remove a shop's explicit settings.
    pub async fn remove(&self, shop: &ShopId) -> Option<ShopSettings> {
        self.settings.write().await.remove(shop)
    }
}

#[async_trait]
impl SettingsSource for StaticSettingsSource {
    async fn fetch(&self, shop: &ShopId) -> Result<Option<ShopSettings>> {
        Ok(self.settings.read().await.get(shop).cloned())
    }
}

// ============================================================================
// Resolver
// ============================================================================

/// Resolves [`ShopSettings`] for a shop, applying defaults and validation.
#[derive(Clone)]
pub struct ShopSettingsResolver {
    source: Arc<dyn SettingsSource>,
    default_lang: Lang,
}

impl ShopSettingsResolver {
    /// Create a resolver over `source`; shops without settings default to
    /// single-language `default_lang`.
    pub fn new(source: Arc<dyn SettingsSource>, default_lang: Lang) -> Self {
        Self {
            source,
            default_lang,
        }
    }

    /// Create a resolver using the configured default language.
    pub fn from_config(source: Arc<dyn SettingsSource>, config: &CatalogConfig) -> Self {
        Self::new(source, config.default_lang())
    }

    /// Resolve settings, surfacing invalid configuration as
    /// [`Error::Config`] and source failures as-is.
    pub async fn try_resolve(&self, shop: &ShopId) -> Result<ShopSettings> {
        match self.source.fetch(shop).await? {
            Some(settings) => {
                settings.validate()?;
                Ok(settings)
            }
            None => Ok(ShopSettings::single_language(
                shop.clone(),
                self.default_lang.clone(),
            )),
        }
    }

    /// Resolve settings, failing closed to single-language mode.
    ///
    /// Invalid settings collapse to their default language; an unreachable
    /// source collapses to the resolver's default language.
    pub async fn resolve(&self, shop: &ShopId) -> ShopSettings {
        match self.source.fetch(shop).await {
            Ok(Some(settings)) => match settings.validate() {
                Ok(()) => settings,
                Err(e) => {
                    log::warn!("{e}; using single-language mode");
                    if settings.default_source_lang.as_str().is_empty() {
                        ShopSettings::single_language(shop.clone(), self.default_lang.clone())
                    } else {
                        settings.fail_closed()
                    }
                }
            },
            Ok(None) => ShopSettings::single_language(shop.clone(), self.default_lang.clone()),
            Err(e) => {
                log::warn!("Settings lookup for shop {shop} failed, using defaults: {e}");
                ShopSettings::single_language(shop.clone(), self.default_lang.clone())
            }
        }
    }
}

impl std::fmt::Debug for ShopSettingsResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShopSettingsResolver")
            .field("default_lang", &self.default_lang)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
