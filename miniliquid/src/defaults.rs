use crate::filters::{self, FilterSet};

pub(crate) fn get_builtin_filters() -> FilterSet {
    let mut rv = FilterSet::new();
    rv.add("escape", filters::escape);
    rv.add("h", filters::escape);
    #[cfg(feature = "builtins")]
    {
        rv.add("size", filters::size);
        rv.add("upcase", filters::upcase);
        rv.add("downcase", filters::downcase);
        rv.add("capitalize", filters::capitalize);
        rv.add("append", filters::append);
        rv.add("prepend", filters::prepend);
        rv.add("strip", filters::strip);
        rv.add("lstrip", filters::lstrip);
        rv.add("rstrip", filters::rstrip);
        rv.add("replace", filters::replace);
        rv.add("replace_first", filters::replace_first);
        rv.add("remove", filters::remove);
        rv.add("remove_first", filters::remove_first);
        rv.add("truncate", filters::truncate);
        rv.add("truncatewords", filters::truncatewords);
        rv.add("split", filters::split);
        rv.add("join", filters::join);
        rv.add("first", filters::first);
        rv.add("last", filters::last);
        rv.add("reverse", filters::reverse);
        rv.add("sort", filters::sort);
        rv.add("uniq", filters::uniq);
        rv.add("map", filters::map);
        rv.add("compact", filters::compact);
        rv.add("slice", filters::slice);
        rv.add("default", filters::default);
        rv.add("plus", filters::plus);
        rv.add("minus", filters::minus);
        rv.add("times", filters::times);
        rv.add("divided_by", filters::divided_by);
        rv.add("modulo", filters::modulo);
        rv.add("round", filters::round);
        rv.add("abs", filters::abs);
        rv.add("newline_to_br", filters::newline_to_br);
        rv.add("strip_newlines", filters::strip_newlines);
        #[cfg(feature = "datetime")]
        {
            rv.add("date", filters::date);
        }
        #[cfg(feature = "json")]
        {
            rv.add("json", filters::json);
        }
        #[cfg(feature = "urlencode")]
        {
            rv.add("url_encode", filters::url_encode);
            rv.add("url_decode", filters::url_decode);
        }
    }
    rv
}
