use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use qt_object::token::{self, Token};
use qt_object::{build_args, Language, LgModifier, Object, ObjectBody};
use qt_store::ObjectStore;
use qt_types::{ObjectKind, ObjectName, Registry};
use tracing::debug;

use crate::cache::ObjectCache;
use crate::error::{ResolveError, ResolveResult};
use crate::mode::Mode;

/// Maximum nesting of include, macro, language and text expansions.
pub const MAX_DEPTH: usize = 64;

static NO_TEXTS: BTreeMap<String, String> = BTreeMap::new();
static NO_NAMES: BTreeSet<String> = BTreeSet::new();

/// Everything one resolution call reads, plus the caller's object cache.
///
/// The cache is the only field written through.
pub struct ResolveContext<'a> {
    store: &'a ObjectStore,
    registry: &'a Registry,
    texts: &'a BTreeMap<String, String>,
    not_replace: &'a BTreeSet<String>,
    env: &'a BTreeMap<String, String>,
    language: Language,
    cache: &'a mut ObjectCache,
}

impl<'a> ResolveContext<'a> {
    pub fn new(store: &'a ObjectStore, registry: &'a Registry, cache: &'a mut ObjectCache) -> Self {
        Self {
            store,
            registry,
            texts: &NO_TEXTS,
            not_replace: &NO_NAMES,
            env: &NO_TEXTS,
            language: Language::N,
            cache,
        }
    }

    /// Values for `t4_name` tokens, keyed by bare name.
    pub fn with_texts(mut self, texts: &'a BTreeMap<String, String>) -> Self {
        self.texts = texts;
        self
    }

    /// Canonical token names (`m4_X`, `r4_key`) left untouched.
    pub fn with_not_replace(mut self, names: &'a BTreeSet<String>) -> Self {
        self.not_replace = names;
        self
    }

    /// Values for `%key` in macro bodies.
    pub fn with_env(mut self, env: &'a BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// Language used by `l4_` tokens without a modifier.
    pub fn with_language(mut self, language: Language) -> Self {
        self.language = language;
        self
    }

    /// Expand the references in `body` selected by `mode`.
    pub fn resolve(&mut self, body: &str, mode: Mode) -> ResolveResult<String> {
        let mut stack = Vec::new();
        self.pass(body, mode, None, &mut stack)
    }

    fn pass(
        &mut self,
        body: &str,
        mode: Mode,
        carried: Option<LgModifier>,
        stack: &mut Vec<String>,
    ) -> ResolveResult<String> {
        if mode == Mode::NONE || !token::has_marker(body) {
            return Ok(body.to_string());
        }
        let split = token::split(body);
        if split.tokens.is_empty() {
            return Ok(body.to_string());
        }

        let active: Vec<bool> = split
            .tokens
            .iter()
            .map(|t| mode.contains(t.kind) && !self.not_replace.contains(&canonical(t)))
            .collect();
        self.prefetch(
            split
                .tokens
                .iter()
                .zip(&active)
                .filter(|(_, on)| **on)
                .map(|(t, _)| t),
        )?;

        let mut carried = carried;
        let mut out = String::with_capacity(body.len());
        out.push_str(split.literals[0]);

        for (i, tok) in split.tokens.iter().enumerate() {
            let next = split.literals[i + 1];
            if !active[i] {
                out.push_str(&tok.text);
                out.push_str(next);
                continue;
            }
            match tok.kind {
                ObjectKind::Registry => {
                    match self.registry_value(tok, carried) {
                        Some(value) => out.push_str(&value),
                        None => out.push_str(&tok.text),
                    }
                    out.push_str(next);
                }
                ObjectKind::Text => {
                    let texts = self.texts;
                    match texts.get(&tok.name) {
                        Some(text) => {
                            enter(&tok.text, stack)?;
                            let expanded = self.pass(text, mode, None, stack)?;
                            stack.pop();
                            out.push_str(&expanded);
                        }
                        None => out.push_str(&tok.text),
                    }
                    out.push_str(next);
                }
                ObjectKind::Include => {
                    match self.stored(tok)? {
                        Some((name, object)) => match &object.body {
                            ObjectBody::Include(include) => {
                                enter(&name.to_string(), stack)?;
                                let expanded = self.pass(&include.content, mode, None, stack)?;
                                stack.pop();
                                out.push_str(&expanded);
                            }
                            _ => out.push_str(&tok.text),
                        },
                        None => out.push_str(&tok.text),
                    }
                    out.push_str(next);
                }
                ObjectKind::Lgcode => {
                    let modifier = match &tok.modifier {
                        Some(raw) => {
                            let parsed: LgModifier =
                                raw.parse().map_err(|source| ResolveError::Modifier {
                                    token: tok.text.clone(),
                                    source,
                                })?;
                            carried = Some(parsed);
                            parsed
                        }
                        None => carried.unwrap_or(LgModifier::plain(self.language)),
                    };
                    let target = match tok.object_name() {
                        Some(name) => self.follow_alias(&name)?,
                        None => None,
                    };
                    match target.as_deref().map(|o| (o.name(), &o.body)) {
                        Some((name, ObjectBody::Lgcode(lgcode))) => {
                            let rendered = modifier.algo.apply(lgcode.text(modifier.language));
                            enter(&name.to_string(), stack)?;
                            let expanded =
                                self.pass(&rendered, mode.for_language_body(), Some(modifier), stack)?;
                            stack.pop();
                            out.push_str(&expanded);
                        }
                        _ => out.push_str(&tok.text),
                    }
                    out.push_str(next);
                }
                ObjectKind::Macro => {
                    let Some((name, object)) = self.stored(tok)? else {
                        out.push_str(&tok.text);
                        out.push_str(next);
                        continue;
                    };
                    let ObjectBody::Macro(mac) = &object.body else {
                        out.push_str(&tok.text);
                        out.push_str(next);
                        continue;
                    };
                    let object_error = |source| ResolveError::Object {
                        token: tok.text.clone(),
                        source,
                    };
                    let (args, rest) = if next.starts_with('(') {
                        let (args, used) = build_args(next).map_err(object_error)?;
                        (args, &next[used..])
                    } else {
                        (Vec::new(), next)
                    };
                    let bound = mac.bind(&args).map_err(object_error)?;
                    let rendered = mac.render(&bound, self.env);
                    enter(&name.to_string(), stack)?;
                    let expanded =
                        self.pass(&format!("{rendered}{rest}"), mode.for_macro_body(), None, stack)?;
                    stack.pop();
                    out.push_str(&expanded);
                }
            }
        }
        Ok(out)
    }

    /// Fetch every stored name among `tokens` the cache does not know yet.
    fn prefetch<'t>(&mut self, tokens: impl Iterator<Item = &'t Token>) -> ResolveResult<()> {
        let missing: Vec<ObjectName> = tokens
            .filter(|t| t.kind.is_stored())
            .filter_map(Token::object_name)
            .filter(|n| !self.cache.contains(n))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        debug!(count = missing.len(), "fetching referenced objects");
        let results = self.store.fetch_list(&missing);
        for (name, result) in missing.into_iter().zip(results) {
            self.remember(name, result)?;
        }
        Ok(())
    }

    fn lookup(&mut self, name: &ObjectName) -> ResolveResult<Option<Arc<Object>>> {
        if let Some(entry) = self.cache.get(name) {
            return Ok(entry);
        }
        let result = self.store.fetch(name);
        self.remember(name.clone(), result)?;
        Ok(self.cache.get(name).flatten())
    }

    fn remember(
        &mut self,
        name: ObjectName,
        result: qt_store::StoreResult<Object>,
    ) -> ResolveResult<()> {
        match result {
            Ok(object) => self.cache.record(name, Some(object)),
            Err(e) if e.is_not_found() => {
                debug!(object = %name, "unknown object left literal");
                self.cache.record(name, None);
            }
            Err(source) => {
                return Err(ResolveError::Fetch {
                    name: name.to_string(),
                    source,
                })
            }
        }
        Ok(())
    }

    fn stored(&mut self, tok: &Token) -> ResolveResult<Option<(ObjectName, Arc<Object>)>> {
        let Some(name) = tok.object_name() else {
            return Ok(None);
        };
        Ok(self.lookup(&name)?.map(|object| (name, object)))
    }

    /// The first lgcode on the alias chain from `name` that has no alias.
    fn follow_alias(&mut self, name: &ObjectName) -> ResolveResult<Option<Arc<Object>>> {
        let mut seen = BTreeSet::new();
        let mut current = name.clone();
        loop {
            if !seen.insert(current.clone()) {
                return Err(ResolveError::AliasCycle {
                    name: name.to_string(),
                });
            }
            let Some(object) = self.lookup(&current)? else {
                return Ok(None);
            };
            let alias = match &object.body {
                ObjectBody::Lgcode(lgcode) => lgcode.alias.as_deref(),
                _ => None,
            };
            match alias.and_then(|a| ObjectName::new(ObjectKind::Lgcode, a).ok()) {
                Some(next) => current = next,
                None => return Ok(Some(object)),
            }
        }
    }

    fn registry_value(&self, tok: &Token, carried: Option<LgModifier>) -> Option<String> {
        let key = tok.name.replace('_', "-");
        let (key, with_base) = match key.strip_suffix('-') {
            Some(stripped) => (stripped.to_string(), true),
            None => (key, false),
        };
        let mut value = self.registry.get(&key)?.to_string();
        if with_base && !value.contains("://") {
            if let Some(base) = self.registry.get(Registry::WEB_BASE_URL) {
                value = format!(
                    "{}/{}",
                    base.trim_end_matches('/'),
                    value.trim_start_matches('/')
                );
            }
        }
        Some(match carried {
            Some(modifier) => modifier.algo.apply(&value),
            None => value,
        })
    }
}

fn canonical(tok: &Token) -> String {
    tok.object_name()
        .map(|n| n.to_string())
        .unwrap_or_else(|| tok.text.clone())
}

fn enter(name: &str, stack: &mut Vec<String>) -> ResolveResult<()> {
    if stack.len() >= MAX_DEPTH || stack.iter().any(|s| s == name) {
        return Err(ResolveError::Recursion {
            name: name.to_string(),
        });
    }
    stack.push(name.to_string());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use qt_object::{Include, Lgcode, Macro, Param};
    use qt_store::MemoryBackend;
    use qt_types::{QPath, ReleaseId};

    fn release() -> ReleaseId {
        ReleaseId::parse("6.30").unwrap()
    }

    fn object(body: ObjectBody) -> Object {
        Object::new(release(), QPath::parse("/app/objects.d").unwrap(), 1, body).unwrap()
    }

    fn store_with(bodies: Vec<ObjectBody>) -> ObjectStore {
        let store = ObjectStore::new(Arc::new(MemoryBackend::new(release())));
        for body in bodies {
            store.store(&object(body)).unwrap();
        }
        store
    }

    fn greet() -> ObjectBody {
        let mut mac = Macro::new("GREET");
        let mut param = Param::new("name");
        param.default = Some("Friend".into());
        mac.params.push(param);
        mac.body = "Hi, $name!".into();
        ObjectBody::Macro(mac)
    }

    fn warn() -> ObjectBody {
        let mut lg = Lgcode::new("warn");
        lg.n = "Let op".into();
        lg.e = "Warning".into();
        ObjectBody::Lgcode(lg)
    }

    fn resolve(store: &ObjectStore, body: &str, mode: &str) -> ResolveResult<String> {
        let registry = Registry::new();
        let mut cache = ObjectCache::new();
        ResolveContext::new(store, &registry, &mut cache).resolve(body, mode.parse()?)
    }

    #[test]
    fn macro_call_binds_positional_argument() {
        let store = store_with(vec![greet()]);
        assert_eq!(
            resolve(&store, "hi m4_GREET(World) bye", "m").unwrap(),
            "hi Hi, World! bye"
        );
    }

    #[test]
    fn macro_without_call_uses_defaults() {
        let store = store_with(vec![greet()]);
        assert_eq!(resolve(&store, "m4_GREET.", "m").unwrap(), "Hi, Friend!.");
        assert_eq!(
            resolve(&store, "m4_GREET(name=«You»)", "m").unwrap(),
            "Hi, You!"
        );
    }

    #[test]
    fn macro_outside_mode_is_literal() {
        let store = store_with(vec![greet()]);
        assert_eq!(
            resolve(&store, "hi m4_GREET(World)", "l").unwrap(),
            "hi m4_GREET(World)"
        );
    }

    #[test]
    fn macro_argument_errors_abort() {
        let store = store_with(vec![greet()]);
        let err = resolve(&store, "m4_GREET(a, b)", "m").unwrap_err();
        assert_eq!(err.code(), "macro.args.toomany");
        let err = resolve(&store, "m4_GREET(a", "m").unwrap_err();
        assert_eq!(err.code(), "parse.args.unclosed");
    }

    #[test]
    fn language_bodies_by_modifier() {
        let store = store_with(vec![warn()]);
        assert_eq!(resolve(&store, "l4_warn", "l").unwrap(), "Let op");
        assert_eq!(resolve(&store, "l4_E_warn", "l").unwrap(), "Warning");
        assert_eq!(resolve(&store, "l4_N_warn", "l").unwrap(), "Let op");
    }

    #[test]
    fn language_modifier_is_carried_forward() {
        let store = store_with(vec![warn()]);
        assert_eq!(
            resolve(&store, "l4_E_warn / l4_warn", "l").unwrap(),
            "Warning / Warning"
        );
    }

    #[test]
    fn undeclared_algorithm_fails() {
        let store = store_with(vec![warn()]);
        let err = resolve(&store, "l4_Nfoo_warn", "l").unwrap_err();
        assert_eq!(err.code(), "resolve.lgcode.modifier");
        let err = resolve(&store, "l4_Q_warn", "l").unwrap_err();
        assert_eq!(err.code(), "resolve.lgcode.modifier");
    }

    #[test]
    fn render_algorithm_applies_to_language_body() {
        let mut lg = Lgcode::new("quote");
        lg.n = "say \"x\"".into();
        let store = store_with(vec![ObjectBody::Lgcode(lg)]);
        assert_eq!(
            resolve(&store, "l4_Njs_quote", "l").unwrap(),
            "say \\x22x\\x22"
        );
    }

    #[test]
    fn aliases_are_followed() {
        let mut alias = Lgcode::new("caution");
        alias.alias = Some("warn".into());
        let store = store_with(vec![warn(), ObjectBody::Lgcode(alias)]);
        assert_eq!(resolve(&store, "l4_E_caution", "l").unwrap(), "Warning");
    }

    #[test]
    fn alias_cycle_is_an_error() {
        let mut a = Lgcode::new("a");
        a.alias = Some("b".into());
        let mut b = Lgcode::new("b");
        b.alias = Some("a".into());
        let store = store_with(vec![ObjectBody::Lgcode(a), ObjectBody::Lgcode(b)]);
        let err = resolve(&store, "l4_a", "l").unwrap_err();
        assert_eq!(err.code(), "resolve.alias.cycle");
    }

    #[test]
    fn language_bodies_do_not_expand_macros() {
        let mut lg = Lgcode::new("mixed");
        lg.n = "m4_GREET and l4_warn".into();
        let store = store_with(vec![greet(), warn(), ObjectBody::Lgcode(lg)]);
        assert_eq!(
            resolve(&store, "l4_mixed", "rilmt").unwrap(),
            "m4_GREET and Let op"
        );
    }

    #[test]
    fn includes_resolve_with_the_same_mode() {
        let include = Include::new("hdr", "[m4_GREET(Ann)]");
        let store = store_with(vec![greet(), ObjectBody::Include(include)]);
        assert_eq!(resolve(&store, "i4_hdr", "im").unwrap(), "[Hi, Ann!]");
        assert_eq!(resolve(&store, "i4_hdr", "i").unwrap(), "[m4_GREET(Ann)]");
    }

    #[test]
    fn includes_in_macro_bodies_stay_literal() {
        let mut mac = Macro::new("Wrap");
        mac.body = "[i4_hdr m4_GREET(Al)]".into();
        let include = Include::new("hdr", "HDR");
        let store = store_with(vec![greet(), ObjectBody::Macro(mac), ObjectBody::Include(include)]);
        assert_eq!(
            resolve(&store, "m4_Wrap i4_hdr", "mi").unwrap(),
            "[i4_hdr Hi, Al!] HDR"
        );
    }

    #[test]
    fn self_including_object_is_an_error() {
        let include = Include::new("loop", "again i4_loop");
        let store = store_with(vec![ObjectBody::Include(include)]);
        let err = resolve(&store, "i4_loop", "i").unwrap_err();
        assert_eq!(err.code(), "resolve.recursion");
    }

    #[test]
    fn sequential_calls_of_one_macro_are_not_recursion() {
        let store = store_with(vec![greet()]);
        assert_eq!(
            resolve(&store, "m4_GREET(a) m4_GREET(b)", "m").unwrap(),
            "Hi, a! Hi, b!"
        );
    }

    #[test]
    fn unknown_objects_stay_literal() {
        let store = store_with(vec![]);
        assert_eq!(
            resolve(&store, "x m4_Nope(1) i4_none l4_none", "rilmt").unwrap(),
            "x m4_Nope(1) i4_none l4_none"
        );
    }

    #[test]
    fn registry_tokens() {
        let store = store_with(vec![]);
        let mut registry = Registry::new();
        registry.insert("home-page", "index.html");
        registry.insert("mail", "https://mail.example.org");
        registry.insert(Registry::WEB_BASE_URL, "https://www.example.org/");
        let mut cache = ObjectCache::new();
        let mut ctx = ResolveContext::new(&store, &registry, &mut cache);
        let mode = "r".parse().unwrap();
        assert_eq!(ctx.resolve("r4_home_page", mode).unwrap(), "index.html");
        assert_eq!(
            ctx.resolve("r4_home_page_", mode).unwrap(),
            "https://www.example.org/index.html"
        );
        assert_eq!(ctx.resolve("r4_mail_", mode).unwrap(), "https://mail.example.org");
        assert_eq!(ctx.resolve("r4_missing", mode).unwrap(), "r4_missing");
    }

    #[test]
    fn texts_and_do_not_replace() {
        let store = store_with(vec![greet()]);
        let registry = Registry::new();
        let texts = BTreeMap::from([("who".to_string(), "m4_GREET(Bo)".to_string())]);
        let skip = BTreeSet::from(["m4_GREET".to_string()]);
        let mut cache = ObjectCache::new();

        let mut ctx = ResolveContext::new(&store, &registry, &mut cache).with_texts(&texts);
        assert_eq!(ctx.resolve("t4_who t4_other", Mode::ALL).unwrap(), "Hi, Bo! t4_other");

        let mut ctx = ResolveContext::new(&store, &registry, &mut cache)
            .with_texts(&texts)
            .with_not_replace(&skip);
        assert_eq!(ctx.resolve("t4_who", Mode::ALL).unwrap(), "m4_GREET(Bo)");
    }

    #[test]
    fn env_values_fill_percent_keys() {
        let mut mac = Macro::new("Where");
        mac.body = "in %qpath".into();
        let store = store_with(vec![ObjectBody::Macro(mac)]);
        let registry = Registry::new();
        let env = BTreeMap::from([("qpath".to_string(), "/app/a.m".to_string())]);
        let mut cache = ObjectCache::new();
        let mut ctx = ResolveContext::new(&store, &registry, &mut cache).with_env(&env);
        assert_eq!(ctx.resolve("m4_Where", Mode::ALL).unwrap(), "in /app/a.m");
    }

    #[test]
    fn cache_is_reused_across_calls() {
        let store = store_with(vec![greet(), warn()]);
        let registry = Registry::new();
        let mut cache = ObjectCache::new();
        let body = "m4_GREET(x) l4_warn m4_Absent";
        let first = ResolveContext::new(&store, &registry, &mut cache)
            .resolve(body, Mode::ALL)
            .unwrap();
        let fetched = cache.fetch_count();
        assert_eq!(fetched, 3);
        let second = ResolveContext::new(&store, &registry, &mut cache)
            .resolve(body, Mode::ALL)
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(cache.fetch_count(), fetched);
    }

    proptest! {
        #[test]
        fn text_without_markers_is_unchanged(body in "[^4]*") {
            let store = store_with(vec![]);
            prop_assert_eq!(resolve(&store, &body, "rilmt").unwrap(), body);
        }
    }
}
