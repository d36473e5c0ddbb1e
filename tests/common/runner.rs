//! `Runner` test model: a configuration container with two optional
//! sub-containers, plus a model-defined RPC.

use netconf_exec::codec::Entity;
use netconf_exec::xml::Element;

pub const RUNNER_NS: &str = "http://cisco.com/ns/yang/ydktest-sanity";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Leaves {
    pub number: Option<i32>,
    pub name: Option<String>,
}

impl Leaves {
    pub fn new(number: i32, name: &str) -> Self {
        Leaves {
            number: Some(number),
            name: Some(name.to_string()),
        }
    }

    fn to_element(&self, tag: &str) -> Element {
        let mut element = Element::new(tag);
        if let Some(number) = self.number {
            element.push_child(Element::new("number").with_text(number.to_string()));
        }
        if let Some(name) = &self.name {
            element.push_child(Element::new("name").with_text(name.clone()));
        }
        element
    }

    fn load(element: &Element) -> Result<Self, String> {
        let number = match element.child_text("number") {
            Some(raw) => Some(raw.parse::<i32>().map_err(|e| format!("number '{}': {}", raw, e))?),
            None => None,
        };
        Ok(Leaves {
            number,
            name: element.child_text("name"),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Runner {
    pub one: Option<Leaves>,
    pub two: Option<Leaves>,
}

impl Entity for Runner {
    fn yang_name(&self) -> &str {
        "runner"
    }

    fn to_element(&self) -> Element {
        let mut element = Element::new("runner").with_attr("xmlns", RUNNER_NS);
        if let Some(one) = &self.one {
            element.push_child(one.to_element("one"));
        }
        if let Some(two) = &self.two {
            element.push_child(two.to_element("two"));
        }
        element
    }

    fn load_element(&mut self, element: &Element) -> Result<(), String> {
        self.one = element.child("one").map(Leaves::load).transpose()?;
        self.two = element.child("two").map(Leaves::load).transpose()?;
        Ok(())
    }
}

/// A model-defined RPC the mock device does not implement.
#[derive(Debug, Clone, Default)]
pub struct RunnerReset;

impl Entity for RunnerReset {
    fn yang_name(&self) -> &str {
        "runner-reset"
    }

    fn is_rpc(&self) -> bool {
        true
    }

    fn to_element(&self) -> Element {
        Element::new("runner-reset").with_attr("xmlns", RUNNER_NS)
    }

    fn load_element(&mut self, _element: &Element) -> Result<(), String> {
        Ok(())
    }
}
