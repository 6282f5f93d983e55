/// A value in an MI record: `"const"`, `{tuple}` or `[list]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MiValue {
    Const(String),
    Tuple(Vec<MiResult>),
    List(Vec<MiListItem>),
}

/// A `name=value` pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MiResult {
    pub name: String,
    pub value: MiValue,
}

/// List elements are either bare values (`["a","b"]`) or keyed results
/// (`[frame={...},frame={...}]`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MiListItem {
    Value(MiValue),
    Result(MiResult),
}

impl MiListItem {
    pub fn value(&self) -> &MiValue {
        match self {
            MiListItem::Value(value) => value,
            MiListItem::Result(result) => &result.value,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            MiListItem::Value(_) => None,
            MiListItem::Result(result) => Some(&result.name),
        }
    }
}

impl MiValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MiValue::Const(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_tuple(&self) -> Option<&[MiResult]> {
        match self {
            MiValue::Tuple(fields) => Some(fields),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[MiListItem]> {
        match self {
            MiValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// Values of a list, with keyed items unwrapped. Empty for non-lists.
    pub fn list_values(&self) -> impl Iterator<Item = &MiValue> {
        self.as_list().unwrap_or_default().iter().map(MiListItem::value)
    }

    /// First field called `name`, looking through tuple fields and keyed list items.
    pub fn get(&self, name: &str) -> Option<&MiValue> {
        match self {
            MiValue::Const(_) => None,
            MiValue::Tuple(fields) => find(fields, name),
            MiValue::List(items) => items.iter().find_map(|item| match item {
                MiListItem::Result(result) if result.name == name => Some(&result.value),
                _ => None,
            }),
        }
    }

    fn index(&self, index: usize) -> Option<&MiValue> {
        match self {
            MiValue::Const(_) => None,
            MiValue::Tuple(fields) => fields.get(index).map(|field| &field.value),
            MiValue::List(items) => items.get(index).map(MiListItem::value),
        }
    }

    /// Resolve a path such as `bkpt.number` or `memory[0].contents` below this value.
    pub fn lookup(&self, path: &str) -> Option<&MiValue> {
        let mut current = self;
        for segment in path.split('.') {
            current = step(current, segment)?;
        }
        Some(current)
    }

    /// Convenience for `lookup(path)?.as_str()`.
    pub fn lookup_str(&self, path: &str) -> Option<&str> {
        self.lookup(path)?.as_str()
    }
}

fn find<'a>(fields: &'a [MiResult], name: &str) -> Option<&'a MiValue> {
    fields
        .iter()
        .find(|field| field.name == name)
        .map(|field| &field.value)
}

fn step<'a>(value: &'a MiValue, segment: &str) -> Option<&'a MiValue> {
    let (name, mut indices) = match segment.find('[') {
        Some(pos) => (&segment[..pos], &segment[pos..]),
        None => (segment, ""),
    };

    let mut current = if name.is_empty() {
        value
    } else {
        value.get(name)?
    };

    while let Some(rest) = indices.strip_prefix('[') {
        let close = rest.find(']')?;
        let index: usize = rest[..close].parse().ok()?;
        current = current.index(index)?;
        indices = &rest[close + 1..];
    }
    Some(current)
}

/// Resolve a path against the top-level fields of a record.
pub fn lookup<'a>(fields: &'a [MiResult], path: &str) -> Option<&'a MiValue> {
    let (head, rest) = match path.find(['.', '[']) {
        Some(pos) => (&path[..pos], &path[pos..]),
        None => (path, ""),
    };
    let root = find(fields, head)?;
    let rest = rest.strip_prefix('.').unwrap_or(rest);
    if rest.is_empty() {
        Some(root)
    } else {
        root.lookup(rest)
    }
}
