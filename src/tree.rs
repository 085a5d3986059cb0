use crate::error::InsertError;
use crate::params::Params;

/// A routing trie for one HTTP method.
///
/// Patterns are split on `/` into segments and stored one node per segment.
/// Each segment of a pattern is either *static* (matches the literal
/// segment), a *parameter* `:name` (matches any single non-empty segment and
/// captures it), or a *catch-all* `*` / `*name` (matches the remainder of
/// the path, including embedded `/`, and must be the last segment).
///
/// The tree is generic over the stored value so it can be exercised without
/// the handler machinery.
pub struct Tree<T> {
    root: Node<T>,
}

struct Node<T> {
    /// The literal segment this node matches. Empty segments are ordinary:
    /// `//` is not collapsed, and a trailing slash is significant.
    label: String,
    handler: Option<T>,
    /// First byte of each static child's label, parallel to `statics`, so
    /// dispatch can skip label comparisons for children that cannot match.
    indices: Vec<u8>,
    statics: Vec<Node<T>>,
    /// At most one parameter child per node; all patterns passing through
    /// this position must agree on the parameter name.
    param: Option<Box<ParamChild<T>>>,
    /// At most one catch-all per node. Always terminal.
    catch_all: Option<CatchAll<T>>,
}

struct ParamChild<T> {
    name: String,
    node: Node<T>,
}

struct CatchAll<T> {
    name: String,
    handler: T,
}

/// Splits off the next segment of a partially consumed path. The returned
/// tail is `None` once the final segment is reached, which is distinct from
/// `Some("")` for a path with a trailing slash.
fn split_segment(rest: &str) -> (&str, Option<&str>) {
    match rest.find('/') {
        Some(i) => (&rest[..i], Some(&rest[i + 1..])),
        None => (rest, None),
    }
}

fn first_byte(seg: &str) -> u8 {
    seg.as_bytes().first().copied().unwrap_or(0)
}

impl<T> Tree<T> {
    pub fn new() -> Tree<T> {
        Tree {
            root: Node::with_label(""),
        }
    }

    /// Registers `handler` under `pattern`.
    ///
    /// Registering the same pattern twice silently replaces the previous
    /// handler. Patterns that cannot coexist with already registered ones
    /// (`/x/:a` vs `/x/:b`), place a catch-all anywhere but the end, or do
    /// not begin with `/` are rejected.
    pub fn insert(&mut self, pattern: &str, handler: T) -> Result<(), InsertError> {
        match pattern.strip_prefix('/') {
            Some(rest) => self.root.insert(rest, pattern, handler),
            None => Err(InsertError::BadPattern {
                pattern: pattern.to_string(),
            }),
        }
    }

    /// Looks up `path`, appending captures to `params` in the order they
    /// are taken.
    ///
    /// At every level a static child wins over the parameter child, which
    /// wins over the catch-all, regardless of registration order. If a
    /// preferred branch matches the current segment but fails deeper down,
    /// the lookup falls back to the next kind and rolls back any captures
    /// taken on the abandoned branch.
    pub fn find<'t>(&'t self, path: &str, params: &mut Params) -> Option<&'t T> {
        self.root.find(path.strip_prefix('/')?, params)
    }
}

impl<T> Default for Tree<T> {
    fn default() -> Tree<T> {
        Tree::new()
    }
}

impl<T> Node<T> {
    fn with_label(label: &str) -> Node<T> {
        Node {
            label: label.to_string(),
            handler: None,
            indices: Vec::new(),
            statics: Vec::new(),
            param: None,
            catch_all: None,
        }
    }

    fn insert(&mut self, rest: &str, pattern: &str, handler: T) -> Result<(), InsertError> {
        let (seg, tail) = split_segment(rest);

        if let Some(name) = seg.strip_prefix(':') {
            if name.is_empty() {
                return Err(InsertError::BadPattern {
                    pattern: pattern.to_string(),
                });
            }
            if let Some(param) = &self.param {
                if param.name != name {
                    return Err(InsertError::ParamNameConflict {
                        new: name.to_string(),
                        existing: param.name.clone(),
                    });
                }
            }
            let param = self.param.get_or_insert_with(|| {
                Box::new(ParamChild {
                    name: name.to_string(),
                    node: Node::with_label(seg),
                })
            });
            return match tail {
                Some(tail) => param.node.insert(tail, pattern, handler),
                None => {
                    param.node.handler = Some(handler);
                    Ok(())
                }
            };
        }

        if let Some(name) = seg.strip_prefix('*') {
            let name = if name.is_empty() { "*" } else { name };
            if tail.is_some() {
                return Err(InsertError::CatchAllNotLast {
                    pattern: pattern.to_string(),
                });
            }
            if let Some(catch_all) = &self.catch_all {
                if catch_all.name != name {
                    return Err(InsertError::ParamNameConflict {
                        new: name.to_string(),
                        existing: catch_all.name.clone(),
                    });
                }
            }
            self.catch_all = Some(CatchAll {
                name: name.to_string(),
                handler,
            });
            return Ok(());
        }

        let i = match self.static_position(seg) {
            Some(i) => i,
            None => {
                self.indices.push(first_byte(seg));
                self.statics.push(Node::with_label(seg));
                self.statics.len() - 1
            }
        };
        match tail {
            Some(tail) => self.statics[i].insert(tail, pattern, handler),
            None => {
                self.statics[i].handler = Some(handler);
                Ok(())
            }
        }
    }

    fn find<'t>(&'t self, rest: &str, params: &mut Params) -> Option<&'t T> {
        let (seg, tail) = split_segment(rest);

        if let Some(i) = self.static_position(seg) {
            let child = &self.statics[i];
            let found = match tail {
                Some(tail) => child.find(tail, params),
                None => child.handler.as_ref(),
            };
            if found.is_some() {
                return found;
            }
        }

        // A parameter never matches an empty segment.
        if !seg.is_empty() {
            if let Some(param) = &self.param {
                let mark = params.len();
                params.push(&param.name, seg);
                let found = match tail {
                    Some(tail) => param.node.find(tail, params),
                    None => param.node.handler.as_ref(),
                };
                if found.is_some() {
                    return found;
                }
                params.truncate(mark);
            }
        }

        if let Some(catch_all) = &self.catch_all {
            // The capture is the remainder without its leading slash.
            params.push(&catch_all.name, rest);
            return Some(&catch_all.handler);
        }

        None
    }

    fn static_position(&self, seg: &str) -> Option<usize> {
        let key = first_byte(seg);
        self.indices
            .iter()
            .enumerate()
            .find(|&(i, &byte)| byte == key && self.statics[i].label == seg)
            .map(|(i, _)| i)
    }
}
